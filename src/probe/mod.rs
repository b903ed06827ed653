pub mod mock;
pub mod packet;
pub mod tag;
pub mod transport;

mod socket;

pub use mock::*;
pub use packet::*;
pub use tag::*;
pub use transport::*;
