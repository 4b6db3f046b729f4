use crate::interface::Transmitter;
use crate::router::Router;
use futures::future;
use rip_rs_packets::EthernetFrame;
use std::io;
use tokio::runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use tracing::info;

/// Everything the router task can be told from outside.
#[derive(Debug)]
pub enum RouterEvent {
    /// A frame arrived on the interface called `iface`.
    Frame { frame: EthernetFrame, iface: String },
    Shutdown,
}

/// Drives `router` until `events` is closed or a `Shutdown` arrives, then hands the router back.
///
/// The router is never shared. This task is the only thing touching it: each loop iteration either
/// handles one event or fires the timers whose deadline has passed, so all state changes happen
/// one at a time in the order they were observed.
pub async fn run_router<T: Transmitter>(
    mut router: Router<T>,
    mut events: UnboundedReceiver<RouterEvent>,
) -> Router<T> {
    loop {
        let deadline = router.next_deadline();
        let timers_due = async move {
            match deadline {
                Some(at) => time::sleep_until(time::Instant::from_std(at)).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.recv() => match event {
                Some(RouterEvent::Frame { frame, iface }) => router.receive(frame, &iface),
                Some(RouterEvent::Shutdown) | None => {
                    info!("router shutting down");
                    return router;
                }
            },
            _ = timers_due => router.poll_timers(),
        }
    }
}

/// Runner is a blocking helper for running a router outside of an existing runtime. It builds a
/// single threaded Tokio runtime, runs the router on it and returns the router once it stops.
pub fn runner<T: Transmitter>(
    router: Router<T>,
    events: UnboundedReceiver<RouterEvent>,
) -> io::Result<Router<T>> {
    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(run_router(router, events)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::utils::test::harness::{
        two_port_interfaces, ETH0_IP, ETH0_MAC, HOST_A, HOST_A_MAC, HOST_B, SLASH_24,
    };
    use crate::utils::test::packet_generators::{arp_reply, echo_request, frame_for};
    use crate::{ChannelTransmitter, InterfaceTable};
    use crossbeam::channel::unbounded;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn runner_stops_on_shutdown() {
        let (s0, r0) = unbounded();
        let (s1, _r1) = unbounded();
        let transmitter = ChannelTransmitter::new()
            .with_sender("eth0", s0)
            .with_sender("eth1", s1);
        let router = Router::new(
            InterfaceTable::new(two_port_interfaces()),
            transmitter,
            RouterConfig::default(),
        );

        let (events, receiver) = mpsc::unbounded_channel();
        events
            .send(RouterEvent::Frame {
                frame: arp_reply(HOST_A_MAC, HOST_A, ETH0_MAC, ETH0_IP),
                iface: "eth0".to_string(),
            })
            .unwrap();
        events.send(RouterEvent::Shutdown).unwrap();

        let router = runner(router, receiver).unwrap();
        assert_eq!(router.arp_cache().lookup(HOST_A), Some(HOST_A_MAC));
        assert!(r0.try_recv().is_err());
    }

    #[tokio::test]
    async fn timers_fire_while_waiting_for_events() {
        let (s0, _r0) = unbounded();
        let (s1, r1) = unbounded();
        let transmitter = ChannelTransmitter::new()
            .with_sender("eth0", s0)
            .with_sender("eth1", s1);
        let config = RouterConfig {
            arp_resend_interval: Duration::from_millis(10),
            ..RouterConfig::default()
        };
        let mut router = Router::new(InterfaceTable::new(two_port_interfaces()), transmitter, config);
        router
            .route_table_mut()
            .insert(Ipv4Addr::new(10, 0, 2, 0), Ipv4Addr::UNSPECIFIED, SLASH_24, "eth1", 0, None)
            .unwrap();

        let (events, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_router(router, receiver));
        events
            .send(RouterEvent::Frame {
                frame: frame_for(echo_request(HOST_A, HOST_B, 64, 1), HOST_A_MAC, ETH0_MAC),
                iface: "eth0".to_string(),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        events.send(RouterEvent::Shutdown).unwrap();
        let router = handle.await.unwrap();

        // One request on arrival, then two resends
        assert_eq!(r1.try_iter().count(), 3);
        assert_eq!(router.pending().len(), 0);
    }
}
