use std::cell::RefCell;

/// Host calls that change the simulation between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// Physical size in device pixels.
    Resize { width: u32, height: u32 },
    Burst(u32),
    Pause(bool),
}

/// Requests that arrived while a capture held the simulation. They're
/// replayed, in order, by the next frame that gets hold of it.
#[derive(Debug, Default)]
pub struct Deferred {
    requests: Vec<Request>,
}

impl Deferred {
    /// Apply `request` to `target` now if nothing else is borrowing it, or
    /// keep it for later.
    pub fn submit<T>(
        &mut self,
        target: &RefCell<T>,
        request: Request,
        apply: impl FnOnce(&mut T, Request),
    ) {
        match target.try_borrow_mut() {
            Ok(mut target) => apply(&mut *target, request),
            Err(_) => self.push(request),
        }
    }

    pub fn push(&mut self, request: Request) {
        // Only the latest size matters.
        if let Request::Resize { .. } = request {
            self.requests
                .retain(|pending| !matches!(pending, Request::Resize { .. }));
        }
        self.requests.push(request);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Request> + '_ {
        self.requests.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
