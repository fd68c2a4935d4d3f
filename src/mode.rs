/// Acquisition channel the user is currently working in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Upload,
    Url,
}

/// Mutually exclusive switch between the two acquisition channels.
#[derive(Debug, Default)]
pub struct ModeSelector {
    active: Mode,
}

impl ModeSelector {
    pub fn new(active: Mode) -> Self {
        Self { active }
    }

    pub fn active(&self) -> Mode {
        self.active
    }

    /// Activates `mode` and returns the mode that was left, or `None` when
    /// `mode` was already active.
    pub fn switch(&mut self, mode: Mode) -> Option<Mode> {
        if self.active == mode {
            return None;
        }
        Some(std::mem::replace(&mut self.active, mode))
    }
}
