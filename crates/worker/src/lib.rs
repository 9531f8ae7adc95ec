mod client;
mod host;
pub mod proto;
mod transport;

pub use crate::{
    client::{spawn, spawn_for, Client, ClientError},
    host::Host,
    transport::{channel_pair, ChannelTransport, PipeTransport, Transport},
};
