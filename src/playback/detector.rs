/// Decides the one instant playback really started.
///
/// The sink's rendering notification alone is unreliable: it can fire while
/// the sink is still hidden, repeat, or never fire until the sink is shown.
/// Confirmation therefore needs two facts together: the rendering signal has
/// been seen (latched) and the sink is visible. Whichever arrives second
/// confirms; nothing after that does, until [`PlaybackStartDetector::reset`].
#[derive(Debug, Default, Clone)]
pub struct PlaybackStartDetector {
    rendering_seen: bool,
    visible: bool,
    confirmed: bool,
}

impl PlaybackStartDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new attempt: both facts and the confirmation are cleared.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns true only on the call that confirms playback.
    pub fn on_rendering_started(&mut self) -> bool {
        self.rendering_seen = true;
        self.evaluate()
    }

    /// Returns true only on the call that confirms playback.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.visible = visible;
        self.evaluate()
    }

    pub fn rendering_seen(&self) -> bool {
        self.rendering_seen
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    fn evaluate(&mut self) -> bool {
        if self.confirmed || !(self.rendering_seen && self.visible) {
            return false;
        }
        self.confirmed = true;
        true
    }
}
