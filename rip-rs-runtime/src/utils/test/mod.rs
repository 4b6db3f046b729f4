pub mod clock;
pub mod packet_generators;
