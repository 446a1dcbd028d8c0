pub mod correlator;
pub mod gateway;
pub mod initiator;
pub mod sink;
pub mod sweeper;
