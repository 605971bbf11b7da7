//! Render result attached to a request by the renderer.
//!
//! Every field is optional: the renderer may fail before filling anything in.
//! Missing values resolve to documented fallbacks rather than errors.

use bytes::Bytes;

/// `status_code` label used when the render produced no status.
pub const UNKNOWN_STATUS: &str = "unknown";

/// `render_type` label used when the render produced no type tag.
pub const DEFAULT_RENDER_TYPE: &str = "html";

/// Named timing phases of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ConnectToBrowser,
    OpenTab,
    LoadUrl,
    ParsePage,
    /// Time spent waiting before the render gave up with an error.
    UntilError,
}

impl Phase {
    /// All phases, in the order they are reported.
    pub const ALL: [Phase; 5] = [
        Phase::ConnectToBrowser,
        Phase::OpenTab,
        Phase::LoadUrl,
        Phase::ParsePage,
        Phase::UntilError,
    ];

    /// Phases that add up to the total render duration. `UntilError` is a
    /// failure path and is reported on its own only.
    pub const TOTAL: [Phase; 4] = [
        Phase::ConnectToBrowser,
        Phase::OpenTab,
        Phase::LoadUrl,
        Phase::ParsePage,
    ];

    /// Value of the `phase` label.
    pub fn label(self) -> &'static str {
        match self {
            Phase::ConnectToBrowser => "timeSpentConnectingToBrowser",
            Phase::OpenTab => "timeSpentOpeningTab",
            Phase::LoadUrl => "timeSpentLoadingUrl",
            Phase::ParsePage => "timeSpentParsingPage",
            Phase::UntilError => "timeUntilError",
        }
    }
}

/// Outcome of one render. Phase durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderResult {
    pub status_code: Option<u16>,
    pub render_type: Option<String>,
    pub content: Option<Bytes>,
    pub time_spent_connecting_to_browser: Option<f64>,
    pub time_spent_opening_tab: Option<f64>,
    pub time_spent_loading_url: Option<f64>,
    pub time_spent_parsing_page: Option<f64>,
    pub time_until_error: Option<f64>,
}

impl RenderResult {
    pub fn phase_ms(&self, phase: Phase) -> Option<f64> {
        match phase {
            Phase::ConnectToBrowser => self.time_spent_connecting_to_browser,
            Phase::OpenTab => self.time_spent_opening_tab,
            Phase::LoadUrl => self.time_spent_loading_url,
            Phase::ParsePage => self.time_spent_parsing_page,
            Phase::UntilError => self.time_until_error,
        }
    }

    pub fn set_phase_ms(&mut self, phase: Phase, millis: f64) {
        let slot = match phase {
            Phase::ConnectToBrowser => &mut self.time_spent_connecting_to_browser,
            Phase::OpenTab => &mut self.time_spent_opening_tab,
            Phase::LoadUrl => &mut self.time_spent_loading_url,
            Phase::ParsePage => &mut self.time_spent_parsing_page,
            Phase::UntilError => &mut self.time_until_error,
        };
        *slot = Some(millis);
    }

    /// Phase duration if it is a finite number greater than zero.
    pub fn positive_phase_ms(&self, phase: Phase) -> Option<f64> {
        self.phase_ms(phase).filter(|ms| ms.is_finite() && *ms > 0.0)
    }

    /// Sum of the connect, open-tab, load-url and parse-page phases.
    ///
    /// Absent, negative or non-finite phases count as zero.
    pub fn total_ms(&self) -> f64 {
        Phase::TOTAL
            .iter()
            .filter_map(|phase| self.phase_ms(*phase))
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .sum()
    }

    /// `status_code` label value. A zero status counts as absent.
    pub fn status_label(&self) -> String {
        match self.status_code {
            Some(code) if code != 0 => code.to_string(),
            _ => UNKNOWN_STATUS.to_string(),
        }
    }

    /// `render_type` label value. An empty tag counts as absent.
    pub fn render_type_label(&self) -> &str {
        match self.render_type.as_deref() {
            Some(tag) if !tag.is_empty() => tag,
            _ => DEFAULT_RENDER_TYPE,
        }
    }

    /// Byte length of the rendered content, if any was produced.
    pub fn content_len(&self) -> Option<usize> {
        self.content
            .as_ref()
            .map(Bytes::len)
            .filter(|len| *len > 0)
    }
}
