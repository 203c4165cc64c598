#![allow(missing_docs)]

use crate::{model::Event, ws::Error as WsError};

#[derive(Debug)]
pub enum CoreMessage {
    Ws(Box<Event>),
    WsClosed(WsError),
    Speaking(bool),
}
