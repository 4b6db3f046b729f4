/// Interfaces are the router's named Ethernet ports, each with one IPv4 address and subnet. Frames
/// leave the router through a `Transmitter`, which maps an interface to whatever actually puts bytes
/// on the wire. The channel backed transmitter is what the binary and the tests use.
pub mod interface;

/// Deadline bookkeeping. Every timed behavior of the router (ARP resends, route aging, periodic
/// advertisements) is a token in a `TimerQueue`, and time itself comes from a `Clock` so tests can
/// move it by hand.
pub mod timer;

/// The router's mutable state: the longest prefix match route table, the ARP cache and the queues
/// of frames waiting on address resolution.
pub mod state;

/// Processors are single steps of the receive pipeline that take a packet and hand on something
/// else, or nothing at all when the packet ends there.
pub mod processor;

/// ICMP messages the router originates: time exceeded, destination unreachable and echo replies.
pub mod icmp;

/// RIPv2 route learning and advertisement.
pub mod rip;

/// The router itself. It owns all state and ties frame reception, forwarding, ARP, ICMP and RIP
/// together behind `receive` and `poll_timers`.
pub mod router;

/// Settings and the text files that describe interfaces, static routes and static ARP entries.
pub mod config;

/// Utility module
pub mod utils;

pub use crate::config::{ConfigError, RouterConfig};
pub use crate::interface::{ChannelTransmitter, Interface, InterfaceTable, Transmitter};
pub use crate::router::Router;
