#![allow(missing_docs)]

use crate::model::Event;

#[derive(Debug)]
pub enum WsMessage {
    Send(Box<Event>),
    SetKeepalive(f64),
}
