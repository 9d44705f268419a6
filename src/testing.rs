//! Test doubles for the transport, the enable line and the debug sink.
use crate::{
    protocol::{RawFrame, Reply, Request},
    sequencer::{EnableLine, Transport, TransportError},
};
use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    sync::{Arc, Mutex},
};

/// Records every frame. Scripted results are returned first; after that the stub
/// behaves like a sensor with an empty register file that echoes writes.
#[derive(Debug, Default)]
pub(crate) struct StubTransport {
    pub frames: Vec<RawFrame>,
    script: VecDeque<Result<Reply, TransportError>>,
    registers: HashMap<u16, u16>,
}

impl StubTransport {
    pub fn push_reply(&mut self, reply: Reply) {
        self.script.push_back(Ok(reply));
    }

    pub fn push_failure(&mut self, error: TransportError) {
        self.script.push_back(Err(error));
    }

    fn simulate(&mut self, request: &Request) -> Reply {
        match request {
            Request::ReadHoldingRegisters { address, quantity } => Reply::Registers(
                (0..*quantity)
                    .map(|offset| {
                        self.registers
                            .get(&(address + offset))
                            .copied()
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
            Request::WriteSingleRegister { address, value } => {
                self.registers.insert(*address, *value);
                Reply::WriteSingleRegister(*address, *value)
            }
            Request::WriteMultipleRegisters { address, values } => {
                for (offset, value) in values.iter().enumerate() {
                    self.registers.insert(address + offset as u16, *value);
                }
                Reply::WriteMultipleRegisters(*address, values.len() as u16)
            }
        }
    }
}

impl Transport for StubTransport {
    fn transact(&mut self, frame: &RawFrame) -> Result<Reply, TransportError> {
        self.frames.push(frame.clone());
        match self.script.pop_front() {
            Some(result) => result,
            None => Ok(self.simulate(&frame.request)),
        }
    }
}

/// Records enable line transitions.
#[derive(Debug, Default, Clone)]
pub(crate) struct EnableSpy(Arc<Mutex<Vec<&'static str>>>);

impl EnableSpy {
    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

impl EnableLine for EnableSpy {
    fn enable(&mut self) {
        self.0.lock().unwrap().push("enable");
    }

    fn disable(&mut self) {
        self.0.lock().unwrap().push("disable");
    }
}

/// A debug sink whose contents stay readable after it was handed over.
#[derive(Debug, Default, Clone)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
