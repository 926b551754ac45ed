//! The SD bus as seen from the host controller.
//!
//! A card answers each command with 0 bytes, a 4-byte short response, or a
//! 16-byte long response (R2); data blocks move as a plain byte stream.
//! The controller is the only master on the bus, so all calls are
//! synchronous.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;

/// Response produced by the card for a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdResponse {
    None,
    Short([u8; 4]),
    Long([u8; 16]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SdBusError {
    #[error("no card on the bus")]
    NoCard,
    #[error("card rejected the command")]
    CommandFailed,
}

pub trait SdBus {
    /// Issue a command (6-bit index) with its 32-bit argument.
    fn submit(&mut self, cmd: u8, arg: u32) -> Result<SdResponse, SdBusError>;

    /// True when the card has data bytes waiting to be read.
    fn data_ready(&self) -> bool;

    fn read_byte(&mut self) -> u8;
    fn write_byte(&mut self, value: u8);
}

#[derive(Default)]
struct ScriptedCardState {
    responses: VecDeque<Result<SdResponse, SdBusError>>,
    read_data: VecDeque<u8>,
    written: Vec<u8>,
    commands: Vec<(u8, u32)>,
}

/// Scriptable card for tests: queue up responses and read data, then inspect
/// the commands and bytes the controller pushed at it. Cloned handles share
/// state, so one can live inside the controller while the test keeps another.
#[derive(Clone, Default)]
pub struct ScriptedCard(Rc<RefCell<ScriptedCardState>>);

impl ScriptedCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next `submit` call. With an empty queue,
    /// commands succeed with [`SdResponse::None`].
    pub fn push_response(&self, response: Result<SdResponse, SdBusError>) {
        self.0.borrow_mut().responses.push_back(response);
    }

    /// Append bytes the card will produce on the data lines.
    pub fn extend_read_data(&self, bytes: impl IntoIterator<Item = u8>) {
        self.0.borrow_mut().read_data.extend(bytes);
    }

    /// Every `(cmd, arg)` submitted so far, in order.
    pub fn commands(&self) -> Vec<(u8, u32)> {
        self.0.borrow().commands.clone()
    }

    /// Every data byte written to the card so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }
}

impl SdBus for ScriptedCard {
    fn submit(&mut self, cmd: u8, arg: u32) -> Result<SdResponse, SdBusError> {
        let mut state = self.0.borrow_mut();
        state.commands.push((cmd, arg));
        state
            .responses
            .pop_front()
            .unwrap_or(Ok(SdResponse::None))
    }

    fn data_ready(&self) -> bool {
        !self.0.borrow().read_data.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        // A real card keeps clocking bytes out; past the end of the scripted
        // data the guest just sees zeros.
        self.0.borrow_mut().read_data.pop_front().unwrap_or(0)
    }

    fn write_byte(&mut self, value: u8) {
        self.0.borrow_mut().written.push(value);
    }
}
