pub mod pinger;

mod dispatch;
mod receiver;
mod session;

pub use pinger::*;
