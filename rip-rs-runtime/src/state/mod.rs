mod route_table;
pub use self::route_table::*;

mod arp_cache;
pub use self::arp_cache::*;

mod pending;
pub use self::pending::*;
