//! Local rewriting of constant assignments in a Python source file.

use serde::{Deserialize, Serialize};

/// Board-specific pin assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Board {
    /// GPIO of the boot button.
    #[serde(default)]
    pub boot_pin: Option<u32>,
    /// GPIO of the status LED.
    #[serde(default)]
    pub led_pin: Option<u32>,
}

impl Board {
    /// A profile with the given pins.
    pub const fn new(boot_pin: Option<u32>, led_pin: Option<u32>) -> Self {
        Self { boot_pin, led_pin }
    }
}

/// One `NAME = default` → `NAME = value` rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Assignment {
    /// Constant name.
    pub name: String,
    /// Literal right-hand side in the template.
    pub default: String,
    /// Replacement right-hand side.
    pub value: String,
}

/// An ordered set of assignment rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use]
pub struct ConstantsPatch {
    /// Applied in order.
    assignments: Vec<Assignment>,
}

/// Output of [`ConstantsPatch::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Patched {
    /// Rewritten source.
    pub text: String,
    /// One line per rewrite that matched, e.g. `_LED_PIN = 8`.
    pub applied: Vec<String>,
}

impl ConstantsPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rewrite of `name = default` to `name = value`.
    pub fn set(mut self, name: &str, default: &str, value: impl ToString) -> Self {
        self.assignments.push(Assignment {
            name: name.to_owned(),
            default: default.to_owned(),
            value: value.to_string(),
        });
        self
    }

    /// The pin rewrites for `board`: `_BOOT_PIN = 0` and `_LED_PIN = 2` are
    /// the template defaults.
    pub fn for_board(board: &Board) -> Self {
        let mut patch = Self::new();
        if let Some(pin) = board.boot_pin {
            patch = patch.set("_BOOT_PIN", "0", pin);
        }
        if let Some(pin) = board.led_pin {
            patch = patch.set("_LED_PIN", "2", pin);
        }
        patch
    }

    /// Rewrites installed so far.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Replaces the first occurrence of each `name = default` in `text`.
    ///
    /// Assignments that do not appear verbatim are skipped.
    pub fn apply(&self, text: &str) -> Patched {
        let mut out = text.to_owned();
        let mut applied = Vec::new();
        for a in &self.assignments {
            let from = format!("{} = {}", a.name, a.default);
            if out.contains(&from) {
                let to = format!("{} = {}", a.name, a.value);
                out = out.replacen(&from, &to, 1);
                applied.push(to);
            }
        }
        Patched { text: out, applied }
    }
}
