use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// One block from the palette. The wire form is the palette's JSON object with a
/// `type` tag; tags this engine does not know decode to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDescriptor {
    MoveSteps {
        steps: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<MoveDirection>,
    },
    TurnDegrees {
        degrees: f32,
    },
    #[serde(rename = "goToXY")]
    GoToXy {
        x: f32,
        y: f32,
    },
    SayFor {
        text: String,
        seconds: f32,
    },
    ThinkFor {
        text: String,
        seconds: f32,
    },
    Repeat {
        times: u32,
        actions: Vec<ActionDescriptor>,
    },
    #[serde(other)]
    Unknown,
}

impl ActionDescriptor {
    pub fn move_steps(steps: f32) -> Self {
        Self::MoveSteps {
            steps,
            direction: None,
        }
    }

    pub fn move_vertical(steps: f32, direction: MoveDirection) -> Self {
        Self::MoveSteps {
            steps,
            direction: Some(direction),
        }
    }

    pub fn turn(degrees: f32) -> Self {
        Self::TurnDegrees { degrees }
    }

    pub fn go_to(x: f32, y: f32) -> Self {
        Self::GoToXy { x, y }
    }

    pub fn say(text: impl Into<String>, seconds: f32) -> Self {
        Self::SayFor {
            text: text.into(),
            seconds,
        }
    }

    pub fn think(text: impl Into<String>, seconds: f32) -> Self {
        Self::ThinkFor {
            text: text.into(),
            seconds,
        }
    }

    /// `times` below one is raised to one. `actions` is captured by value, so later
    /// edits to the queue it was copied from do not leak into the repeat.
    pub fn repeat(times: u32, actions: Vec<ActionDescriptor>) -> Self {
        Self::Repeat {
            times: times.max(1),
            actions,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::MoveSteps { .. } => "moveSteps",
            Self::TurnDegrees { .. } => "turnDegrees",
            Self::GoToXy { .. } => "goToXY",
            Self::SayFor { .. } => "sayFor",
            Self::ThinkFor { .. } => "thinkFor",
            Self::Repeat { .. } => "repeat",
            Self::Unknown => "unknown",
        }
    }

    /// Deepest `repeat` nesting below this descriptor; plain actions are depth 0.
    pub fn nesting_depth(&self) -> usize {
        match self {
            Self::Repeat { actions, .. } => {
                1 + actions
                    .iter()
                    .map(ActionDescriptor::nesting_depth)
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Human-readable block text for the debug log.
    pub fn label(&self) -> String {
        match self {
            Self::MoveSteps {
                steps,
                direction: None,
            } => format!("Walk {steps} pixels"),
            Self::MoveSteps {
                steps,
                direction: Some(MoveDirection::Up),
            } => format!("Walk {steps} pixels up"),
            Self::MoveSteps {
                steps,
                direction: Some(MoveDirection::Down),
            } => format!("Walk {steps} pixels down"),
            Self::TurnDegrees { degrees } => format!("Spin {degrees}°"),
            Self::GoToXy { x, y } => format!("Jump to ({x}, {y})"),
            Self::SayFor { text, seconds } => format!("Say \"{text}\" for {seconds}s"),
            Self::ThinkFor { text, seconds } => format!("Think \"{text}\" for {seconds}s"),
            Self::Repeat { times, actions } => {
                format!("Repeat {times} times ({} blocks)", actions.len())
            }
            Self::Unknown => "Unknown block".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_palette_json() {
        let raw = json!([
            { "type": "moveSteps", "steps": 30 },
            { "type": "moveSteps", "steps": 30, "direction": "up" },
            { "type": "turnDegrees", "degrees": 360 },
            { "type": "goToXY", "x": 100, "y": 100 },
            { "type": "sayFor", "text": "Hello there!", "seconds": 2 },
            { "type": "thinkFor", "text": "Hmm...", "seconds": 2 },
            { "type": "repeat", "times": 3, "actions": [{ "type": "moveSteps", "steps": 10 }] }
        ]);

        let actions: Vec<ActionDescriptor> = serde_json::from_value(raw).expect("decode");

        assert_eq!(
            actions,
            vec![
                ActionDescriptor::move_steps(30.0),
                ActionDescriptor::move_vertical(30.0, MoveDirection::Up),
                ActionDescriptor::turn(360.0),
                ActionDescriptor::go_to(100.0, 100.0),
                ActionDescriptor::say("Hello there!", 2.0),
                ActionDescriptor::think("Hmm...", 2.0),
                ActionDescriptor::repeat(3, vec![ActionDescriptor::move_steps(10.0)]),
            ]
        );
    }

    #[test]
    fn unknown_tag_decodes_to_unknown() {
        let action: ActionDescriptor =
            serde_json::from_value(json!({ "type": "hide" })).expect("decode");
        assert_eq!(action, ActionDescriptor::Unknown);
    }

    #[test]
    fn encodes_with_palette_tags() {
        let encoded = serde_json::to_value(ActionDescriptor::go_to(5.0, 6.0)).expect("encode");
        assert_eq!(encoded, json!({ "type": "goToXY", "x": 5.0, "y": 6.0 }));
        let encoded = serde_json::to_value(ActionDescriptor::move_steps(15.0)).expect("encode");
        assert_eq!(encoded, json!({ "type": "moveSteps", "steps": 15.0 }));
    }

    #[test]
    fn repeat_constructor_raises_zero_times() {
        assert_eq!(
            ActionDescriptor::repeat(0, Vec::new()),
            ActionDescriptor::Repeat {
                times: 1,
                actions: Vec::new()
            }
        );
    }

    #[test]
    fn nesting_depth_counts_repeat_levels() {
        let inner = ActionDescriptor::repeat(2, vec![ActionDescriptor::turn(5.0)]);
        let outer = ActionDescriptor::repeat(2, vec![ActionDescriptor::turn(1.0), inner]);
        assert_eq!(ActionDescriptor::turn(1.0).nesting_depth(), 0);
        assert_eq!(outer.nesting_depth(), 2);
    }

    #[test]
    fn labels_read_like_blocks() {
        assert_eq!(ActionDescriptor::move_steps(15.0).label(), "Walk 15 pixels");
        assert_eq!(ActionDescriptor::turn(-90.0).label(), "Spin -90°");
        assert_eq!(
            ActionDescriptor::say("Hi friend!", 2.0).label(),
            "Say \"Hi friend!\" for 2s"
        );
        assert_eq!(
            ActionDescriptor::repeat(10, vec![ActionDescriptor::move_steps(15.0)]).label(),
            "Repeat 10 times (1 blocks)"
        );
    }
}
