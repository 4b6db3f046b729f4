use crate::timer::{TimerQueue, TimerToken};
use rip_rs_packets::{EthernetFrame, MacAddr};
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// What the owner of the pending queues has to do after a resend timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Ask who has `target` out of `interface`.
    SendRequest { target: Ipv4Addr, interface: String },
    /// Nobody answered. `frame` is the oldest queued frame and should be answered with
    /// host unreachable, the `dropped` frames behind it are gone.
    GiveUp {
        target: Ipv4Addr,
        frame: EthernetFrame,
        dropped: usize,
    },
}

#[derive(Debug)]
struct PendingResolution {
    interface: String,
    frames: VecDeque<EthernetFrame>,
    retries: u32,
    timer: TimerToken,
}

/// Frames waiting on address resolution, one FIFO per next hop IP. Each queue owns a
/// resend timer that fires as soon as the queue is created and then every resend
/// interval until a reply arrives. The tick that sends the last allowed request also
/// gives up on the queue.
#[derive(Debug)]
pub struct PendingResolutions {
    queues: HashMap<Ipv4Addr, PendingResolution>,
    timers: TimerQueue<Ipv4Addr>,
    resend_interval: Duration,
    max_retries: u32,
}

impl PendingResolutions {
    pub fn new(resend_interval: Duration, max_retries: u32) -> Self {
        PendingResolutions {
            queues: HashMap::new(),
            timers: TimerQueue::new(),
            resend_interval,
            max_retries,
        }
    }

    /// Queues `frame` behind any others waiting on `next_hop`. Returns true if this
    /// created the queue.
    pub fn enqueue(
        &mut self,
        next_hop: Ipv4Addr,
        interface: &str,
        frame: EthernetFrame,
        now: Instant,
    ) -> bool {
        if let Some(pending) = self.queues.get_mut(&next_hop) {
            pending.frames.push_back(frame);
            return false;
        }
        let timer = self.timers.schedule(now, next_hop);
        let mut frames = VecDeque::new();
        frames.push_back(frame);
        self.queues.insert(
            next_hop,
            PendingResolution {
                interface: interface.to_string(),
                frames,
                retries: 0,
                timer,
            },
        );
        true
    }

    /// Runs every resend timer due at `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<ResolutionAction> {
        let mut actions = vec![];
        for (token, target) in self.timers.pop_due(now) {
            let pending = match self.queues.get_mut(&target) {
                Some(pending) if pending.timer == token => pending,
                _ => continue,
            };

            if pending.frames.is_empty() {
                continue;
            }

            pending.retries += 1;
            actions.push(ResolutionAction::SendRequest {
                target,
                interface: pending.interface.clone(),
            });
            if pending.retries < self.max_retries {
                pending.timer = self.timers.schedule(now + self.resend_interval, target);
                continue;
            }

            // Last request is out, nothing more is waited for
            if let Some(mut pending) = self.queues.remove(&target) {
                if let Some(frame) = pending.frames.pop_front() {
                    actions.push(ResolutionAction::GiveUp {
                        target,
                        frame,
                        dropped: pending.frames.len(),
                    });
                }
            }
        }
        actions
    }

    /// Completes every frame waiting on `ip` with `mac` and hands them back in the
    /// order they were queued. The queue and its timer are discarded.
    pub fn resolve(&mut self, ip: Ipv4Addr, mac: MacAddr) -> Option<Vec<EthernetFrame>> {
        let pending = self.queues.remove(&ip)?;
        self.timers.cancel(pending.timer);
        Some(
            pending
                .frames
                .into_iter()
                .map(|mut frame| {
                    frame.set_dest_mac(mac);
                    frame
                })
                .collect(),
        )
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.queues.contains_key(&ip)
    }

    /// Number of frames waiting on `ip`.
    pub fn queued(&self, ip: Ipv4Addr) -> usize {
        self.queues.get(&ip).map_or(0, |pending| pending.frames.len())
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEXT_HOP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

    fn frame(tag: u8) -> EthernetFrame {
        let mut frame = EthernetFrame::empty();
        frame.set_payload(&[tag]);
        frame
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn first_request_goes_out_immediately() {
        let start = Instant::now();
        let mut pending = PendingResolutions::new(secs(1), 3);
        assert!(pending.enqueue(NEXT_HOP, "eth1", frame(1), start));
        assert!(!pending.enqueue(NEXT_HOP, "eth1", frame(2), start));
        assert_eq!(pending.queued(NEXT_HOP), 2);
        assert_eq!(pending.next_deadline(), Some(start));

        assert_eq!(
            pending.poll(start),
            vec![ResolutionAction::SendRequest {
                target: NEXT_HOP,
                interface: "eth1".to_string()
            }]
        );
        assert!(pending.poll(start).is_empty());
        assert_eq!(pending.next_deadline(), Some(start + secs(1)));
    }

    #[test]
    fn gives_up_after_three_requests() {
        let start = Instant::now();
        let mut pending = PendingResolutions::new(secs(1), 3);
        pending.enqueue(NEXT_HOP, "eth1", frame(1), start);
        pending.enqueue(NEXT_HOP, "eth1", frame(2), start);

        let mut requests = 0;
        for t in 0..2 {
            for action in pending.poll(start + secs(t)) {
                match action {
                    ResolutionAction::SendRequest { .. } => requests += 1,
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
        assert_eq!(requests, 2);
        assert!(pending.contains(NEXT_HOP));

        let actions = pending.poll(start + secs(2));
        assert_eq!(
            actions,
            vec![
                ResolutionAction::SendRequest {
                    target: NEXT_HOP,
                    interface: "eth1".to_string()
                },
                ResolutionAction::GiveUp {
                    target: NEXT_HOP,
                    frame: frame(1),
                    dropped: 1
                }
            ]
        );
        assert!(!pending.contains(NEXT_HOP));
        assert!(pending.resolve(NEXT_HOP, MacAddr::new([0xaa, 0, 0, 0, 0, 1])).is_none());
        assert!(pending.poll(start + secs(10)).is_empty());
        assert_eq!(pending.next_deadline(), None);
    }

    #[test]
    fn resolve_flushes_in_order() {
        let start = Instant::now();
        let mac = MacAddr::new([0xaa, 0, 0, 0, 0, 1]);
        let mut pending = PendingResolutions::new(secs(1), 3);
        for tag in 1..=3 {
            pending.enqueue(NEXT_HOP, "eth1", frame(tag), start);
        }
        pending.poll(start);

        let frames = pending.resolve(NEXT_HOP, mac).unwrap();
        let tags: Vec<u8> = frames.iter().map(|f| f.payload()[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert!(frames.iter().all(|f| f.dest_mac() == mac));

        assert!(pending.is_empty());
        assert!(pending.resolve(NEXT_HOP, mac).is_none());
        assert!(pending.poll(start + secs(5)).is_empty());
    }
}
