/*
Time-queue helpers for the memory pipeline.

Components that have a fixed processing latency (cache banks, the ideal memory controller) wrap
their in-flight work in a TimedServer, which enforces a simple service law:
    - A base latency plus a throughput component expressed in bytes-per-cycle

Latency and throughput are independent: a server keeps accepting new work every cycle as long
as its occupancy bound is not reached, so it behaves like a pipeline of depth `base_latency`.
When the server cannot accept more work it returns a Backpressure that hands the request back to
the caller, which is expected to retry the same request on a later tick.

Accepted requests yield a `Ticket` saying when the service will complete. The owner polls
`service_ready` (or `pop_ready_if`) once per tick to drain everything that finished.
*/

use std::collections::VecDeque;

pub type Cycle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    ready_at: Cycle,
}

impl Ticket {
    // Cycle at which the payload becomes visible to the owner.
    pub fn ready_at(&self) -> Cycle {
        self.ready_at
    }

    pub fn is_ready(&self, now: Cycle) -> bool {
        now >= self.ready_at
    }
}

#[derive(Debug)]
pub struct ServiceRequest<T> {
    pub payload: T,
    // Only contributes to service time; zero-sized requests pipeline back to back
    pub size_bytes: u32,
}

impl<T> ServiceRequest<T> {
    pub fn new(payload: T, size_bytes: u32) -> Self {
        Self { payload, size_bytes }
    }
}

#[derive(Debug)]
pub enum Backpressure<T> {
    // Occupancy bound reached
    QueueFull { request: ServiceRequest<T>, capacity: usize },
    // The server is still transferring the previous payload
    Busy { request: ServiceRequest<T>, available_at: Cycle },
}

impl<T> Backpressure<T> {
    pub fn into_request(self) -> ServiceRequest<T> {
        match self {
            Backpressure::QueueFull { request, .. } => request,
            Backpressure::Busy { request, .. } => request,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub base_latency: Cycle,
    pub bytes_per_cycle: u32,
    // Maximum number of payloads in flight
    pub queue_capacity: usize,
}

#[derive(Debug)]
struct Inflight<T> {
    payload: T,
    ticket: Ticket,
}

// Completes payloads in the order they were accepted.
#[derive(Debug)]
pub struct TimedServer<T> {
    config: ServerConfig,
    inflight: VecDeque<Inflight<T>>,
    busy_until: Cycle,
}

impl<T> TimedServer<T> {
    pub fn new(config: ServerConfig) -> Self {
        assert!(config.bytes_per_cycle > 0, "bytes_per_cycle must be > 0");
        assert!(config.queue_capacity > 0, "queue_capacity must be > 0");
        Self {
            config,
            inflight: VecDeque::with_capacity(config.queue_capacity),
            busy_until: 0,
        }
    }

    pub fn can_accept(&self) -> bool {
        self.inflight.len() < self.config.queue_capacity
    }

    pub fn try_enqueue(
        &mut self,
        now: Cycle,
        request: ServiceRequest<T>,
    ) -> Result<Ticket, Backpressure<T>> {
        if !self.can_accept() {
            return Err(Backpressure::QueueFull {
                request,
                capacity: self.config.queue_capacity,
            });
        }
        if self.busy_until > now {
            return Err(Backpressure::Busy {
                request,
                available_at: self.busy_until,
            });
        }

        let service_cycles =
            (request.size_bytes as u64).div_ceil(self.config.bytes_per_cycle as u64);
        let ticket = Ticket {
            ready_at: now
                .saturating_add(self.config.base_latency)
                .saturating_add(service_cycles),
        };
        self.busy_until = now.saturating_add(service_cycles);
        self.inflight.push_back(Inflight {
            payload: request.payload,
            ticket,
        });
        Ok(ticket)
    }

    // Hands every payload finished by `now` to `callback`, oldest first.
    pub fn service_ready<F>(&mut self, now: Cycle, mut callback: F)
    where
        F: FnMut(T),
    {
        while let Some(payload) = self.pop_ready_if(now, |_| true) {
            callback(payload);
        }
    }

    // Hand back the oldest completed payload only if `accept` takes it; otherwise it stays at the
    // head of the queue and blocks everything behind it.
    pub fn pop_ready_if<F>(&mut self, now: Cycle, accept: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let front = self.inflight.front()?;
        if !front.ticket.is_ready(now) || !accept(&front.payload) {
            return None;
        }
        self.inflight.pop_front().map(|inflight| inflight.payload)
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn clear(&mut self) {
        self.inflight.clear();
        self.busy_until = 0;
    }
}
