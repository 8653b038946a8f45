#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    RenderScheduled,
}

/// Collapses any number of render requests between frames into one render.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    state: RenderState,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this call armed a new frame.
    pub fn request(&mut self) -> bool {
        match self.state {
            RenderState::Idle => {
                self.state = RenderState::RenderScheduled;
                true
            }
            RenderState::RenderScheduled => false,
        }
    }

    /// Called at the start of a render pass, so requests made while rendering re-arm.
    pub fn begin_render(&mut self) -> bool {
        let was_scheduled = self.is_scheduled();
        self.state = RenderState::Idle;
        was_scheduled
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == RenderState::RenderScheduled
    }

    pub fn state(&self) -> RenderState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_requests_collapse_into_one() {
        let mut scheduler = RenderScheduler::new();
        assert!(scheduler.request());
        assert!(!scheduler.request());
        assert!(!scheduler.request());
        assert!(scheduler.begin_render());
        assert_eq!(scheduler.state(), RenderState::Idle);
    }

    #[test]
    fn request_during_render_rearms() {
        let mut scheduler = RenderScheduler::new();
        scheduler.request();
        scheduler.begin_render();
        assert!(scheduler.request());
        assert!(scheduler.is_scheduled());
    }
}
