use commands::{RunEvent, SinkEvent};
use crossbeam_channel::{Receiver, TryRecvError};
use debugger::DebugEvent;

/// Anything the UI has to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Output(SinkEvent),
    Run(RunEvent),
    Debug(DebugEvent),
}

impl UiEvent {
    fn source_rank(&self) -> u8 {
        match self {
            UiEvent::Output(_) => 0,
            UiEvent::Run(_) => 1,
            UiEvent::Debug(_) => 2,
        }
    }
}

/// The event sources of a project, drained together once per UI tick
#[derive(Debug, Clone)]
pub struct EventQueue {
    sinks: Receiver<SinkEvent>,
    runs: Receiver<RunEvent>,
    debug: Receiver<DebugEvent>,
}

fn drain<T>(rx: &Receiver<T>, out: &mut Vec<UiEvent>, wrap: fn(T) -> UiEvent) {
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(wrap(event)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

impl EventQueue {
    pub fn new(
        sinks: Receiver<SinkEvent>,
        runs: Receiver<RunEvent>,
        debug: Receiver<DebugEvent>,
    ) -> Self {
        Self { sinks, runs, debug }
    }

    /// Everything queued so far; output first, then runs, then the debugger
    pub fn drain(&self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        drain(&self.sinks, &mut out, UiEvent::Output);
        drain(&self.runs, &mut out, UiEvent::Run);
        drain(&self.debug, &mut out, UiEvent::Debug);
        out
    }

    /// Block until some source has an event, then drain everything.
    ///
    /// The order is the same as [`EventQueue::drain`] whichever source woke
    /// the queue, so a run's output always comes before its `Finished`.
    pub fn wait(&self) -> Vec<UiEvent> {
        let first = crossbeam_channel::select! {
            recv(self.sinks) -> event => event.ok().map(UiEvent::Output),
            recv(self.runs) -> event => event.ok().map(UiEvent::Run),
            recv(self.debug) -> event => event.ok().map(UiEvent::Debug),
        };
        let mut out: Vec<UiEvent> = first.into_iter().collect();
        out.extend(self.drain());
        // stable: each source keeps its own order
        out.sort_by_key(UiEvent::source_rank);
        out
    }
}
