pub mod runner;

/// Helpers for driving a router in tests: a hand cranked clock, frame builders and decoders for
/// what the router sent.
pub mod test;
