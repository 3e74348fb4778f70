// src/materials/override_ctl.rs
//! Shader override state machine.
//!
//! ```text
//!              enable (no user source)
//!  GENERATED ─────────────────────────► OVERRIDE_EMPTY ──set_source(non-empty)──► OVERRIDE_ACTIVE
//!      ▲    ◄──────── disable ────────────────┘  ▲                                     │
//!      │                                         └──────── set_source("") ─────────────┤
//!      └──────────────────────────── disable ──────────────────────────────────────────┘
//! ```
//!
//! The buffer survives `disable`; re-enabling puts a user-authored buffer
//! straight back into effect. A buffer that was only seeded from generated
//! code is re-seeded from the latest generated source on every enable.

/// Help topic name for the override toggle.
pub const OVERRIDE_HELP_TOPIC: &str = "shader_override";

/// Help text shown next to the override toggle.
pub const OVERRIDE_HELP: &str = r"
While the override is enabled and holds source, the material uses that code
instead of the generated shader. Enabling it while empty copies in the current
generated shader as a starting point.

Keep custom code below the __END_HEADER__ line. The header above it belongs to
the generator and is replaced whenever the header is regenerated. Uniform values
keep flowing to the override shader for every uniform it declares.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideState {
    Generated,
    OverrideEmpty,
    OverrideActive,
}

#[derive(Debug, Clone, Default)]
pub struct OverrideController {
    enabled: bool,
    buffer: String,
    authored: bool,
}

impl OverrideController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a saved buffer, treated as user-authored when non-empty.
    pub fn with_buffer(enabled: bool, buffer: String) -> Self {
        let authored = !buffer.is_empty();
        Self {
            enabled,
            buffer,
            authored,
        }
    }

    pub fn state(&self) -> OverrideState {
        match (self.enabled, self.authored) {
            (false, _) => OverrideState::Generated,
            (true, false) => OverrideState::OverrideEmpty,
            (true, true) => OverrideState::OverrideActive,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The retained buffer, whether or not it is in effect.
    #[inline]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the buffer holds user-supplied text (as opposed to a seed).
    #[inline]
    pub fn is_authored(&self) -> bool {
        self.authored
    }

    /// Enables the override. Without user source the buffer is seeded from
    /// `generated`.
    pub fn enable(&mut self, generated: &str) -> OverrideState {
        self.enabled = true;
        if !self.authored {
            self.buffer = generated.to_string();
        }
        self.state()
    }

    /// Disables the override; the buffer is kept.
    pub fn disable(&mut self) -> OverrideState {
        self.enabled = false;
        self.state()
    }

    /// Stores user source. Empty text clears authorship; while enabled the
    /// buffer is then re-seeded from `generated`.
    pub fn set_source(&mut self, text: &str, generated: &str) -> OverrideState {
        if text.is_empty() {
            self.authored = false;
            self.buffer = if self.enabled {
                generated.to_string()
            } else {
                String::new()
            };
        } else {
            self.authored = true;
            self.buffer = text.to_string();
        }
        self.state()
    }

    /// Replaces the buffer text without touching authorship. Used when the
    /// header of the override is regenerated.
    pub fn replace_buffer(&mut self, text: String) {
        self.buffer = text;
    }

    /// The source that should be live: the buffer while enabled, otherwise
    /// `generated`.
    pub fn effective<'a>(&'a self, generated: &'a str) -> &'a str {
        if self.enabled {
            &self.buffer
        } else {
            generated
        }
    }
}
