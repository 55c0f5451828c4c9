use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    #[must_use]
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct InFlight {
    ticket: RequestTicket,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct RequestLine {
    generation: u64,
    in_flight: Option<InFlight>,
}

impl RequestLine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, spawn: impl FnOnce(RequestTicket) -> JoinHandle<()>) -> RequestTicket {
        self.cancel();
        self.generation += 1;
        let ticket = RequestTicket(self.generation);
        let handle = spawn(ticket);
        self.in_flight = Some(InFlight { ticket, handle });
        ticket
    }

    pub fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.handle.abort();
        true
    }

    /// Accepts a completion. Returns `false` for stale tickets, which must be
    /// discarded by the caller.
    pub fn complete(&mut self, ticket: RequestTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.in_flight = None;
        true
    }

    #[must_use]
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ticket == ticket)
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<RequestTicket> {
        self.in_flight.as_ref().map(|in_flight| in_flight.ticket)
    }
}

impl Drop for RequestLine {
    fn drop(&mut self) {
        self.cancel();
    }
}
