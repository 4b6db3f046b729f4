mod dec_ip_hop;
pub use self::dec_ip_hop::*;

mod validate_checksum;
pub use self::validate_checksum::*;

/// One step of the receive pipeline. A processor takes ownership of a packet and either
/// hands something on or swallows it by returning None.
pub trait Processor {
    type Input: Send + Clone;
    type Output: Send + Clone;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output>;
}
