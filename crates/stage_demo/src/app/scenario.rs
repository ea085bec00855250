use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stage_engine::{ActionDescriptor, Notice, Sandbox, SpriteId, StageBounds, Vec2};
use thiserror::Error;

pub(crate) const SCENARIO_VERSION: u32 = 1;
const MAX_REPEAT_NESTING: usize = 8;
const MIN_STAGE_SIDE: f32 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) scenario_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) stage: Option<StageSize>,
    pub(crate) sprites: Vec<ScenarioSprite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageSize {
    pub(crate) width: f32,
    pub(crate) height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenarioSprite {
    #[serde(default)]
    pub(crate) label: String,
    /// Omitted positions are picked at random inside the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) position: Option<Vec2>,
    #[serde(default)]
    pub(crate) actions: Vec<ActionDescriptor>,
}

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("read scenario '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse scenario json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self, ScenarioError> {
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let scenario = serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer)
            .map_err(|error| {
                let path = error.path().to_string();
                ScenarioError::Parse {
                    path: if path.is_empty() { ".".to_string() } else { path },
                    source: error.into_inner(),
                }
            })?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub(crate) fn validate(&self) -> Result<(), ScenarioError> {
        if self.scenario_version != SCENARIO_VERSION {
            return Err(invalid(
                "scenario_version",
                format!(
                    "expected {SCENARIO_VERSION}, got {}",
                    self.scenario_version
                ),
            ));
        }
        if let Some(stage) = self.stage {
            for (field, value) in [("width", stage.width), ("height", stage.height)] {
                if !value.is_finite() || value <= MIN_STAGE_SIDE {
                    return Err(invalid(
                        &format!("stage.{field}"),
                        format!("expected a finite size above {MIN_STAGE_SIDE}, got {value}"),
                    ));
                }
            }
        }
        if self.sprites.is_empty() {
            return Err(invalid("sprites", "expected at least one sprite"));
        }
        for (index, sprite) in self.sprites.iter().enumerate() {
            if let Some(position) = sprite.position {
                if !position.x.is_finite() || !position.y.is_finite() {
                    return Err(invalid(
                        &format!("sprites[{index}].position"),
                        "coordinates must be finite",
                    ));
                }
            }
            for (action_index, action) in sprite.actions.iter().enumerate() {
                validate_action(action, &format!("sprites[{index}].actions[{action_index}]"))?;
            }
        }
        Ok(())
    }

    /// Stage bounds for the show: the scenario's own size when it names one.
    pub(crate) fn bounds(&self, fallback: StageBounds) -> StageBounds {
        match self.stage {
            Some(size) => StageBounds {
                width: size.width,
                height: size.height,
                ..fallback
            },
            None => fallback,
        }
    }

    /// Adds every sprite with its queue. The last sprite ends up selected.
    pub(crate) fn install(&self, sandbox: &Sandbox) -> Result<Vec<SpriteId>, Notice> {
        let mut installed = Vec::with_capacity(self.sprites.len());
        for sprite in &self.sprites {
            let sprite_id = sandbox.add_sprite(sprite.label.clone(), sprite.position);
            for action in &sprite.actions {
                sandbox.enqueue_action(sprite_id, action.clone())?;
            }
            installed.push(sprite_id);
        }
        Ok(installed)
    }
}

fn validate_action(action: &ActionDescriptor, path: &str) -> Result<(), ScenarioError> {
    match action {
        ActionDescriptor::Repeat { times, actions } => {
            if *times == 0 {
                return Err(invalid(&format!("{path}.times"), "expected at least 1"));
            }
            if action.nesting_depth() > MAX_REPEAT_NESTING {
                return Err(invalid(
                    path,
                    format!("repeat blocks nest deeper than {MAX_REPEAT_NESTING} levels"),
                ));
            }
            for (index, nested) in actions.iter().enumerate() {
                validate_action(nested, &format!("{path}.actions[{index}]"))?;
            }
            Ok(())
        }
        ActionDescriptor::SayFor { seconds, .. } | ActionDescriptor::ThinkFor { seconds, .. } => {
            if !seconds.is_finite() || *seconds < 0.0 {
                return Err(invalid(
                    &format!("{path}.seconds"),
                    format!("expected a non-negative duration, got {seconds}"),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn invalid(path: &str, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Invalid {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Two sprites walking toward each other on a compact stage; they meet part way
/// through their repeat blocks and trade queues.
pub(crate) fn collision_demo() -> Scenario {
    let walk = |step: f32| {
        vec![
            ActionDescriptor::move_steps(step),
            ActionDescriptor::repeat(10, vec![ActionDescriptor::move_steps(step)]),
        ]
    };
    Scenario {
        scenario_version: SCENARIO_VERSION,
        stage: Some(StageSize {
            width: 350.0,
            height: 262.0,
        }),
        sprites: vec![
            ScenarioSprite {
                label: "Cat".to_string(),
                position: Some(Vec2::new(80.0, 131.0)),
                actions: walk(15.0),
            },
            ScenarioSprite {
                label: "Dog".to_string(),
                position: Some(Vec2::new(270.0, 131.0)),
                actions: walk(-15.0),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use serde_json::json;

    #[test]
    fn shipped_demo_file_matches_builtin() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/collision_demo.json");
        let loaded = Scenario::load(&path).expect("load demo");
        assert_eq!(loaded, collision_demo());
    }

    #[test]
    fn shipped_parade_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/parade.json");
        let scenario = Scenario::load(&path).expect("load parade");
        assert_eq!(scenario.sprites.len(), 3);
        assert_eq!(scenario.sprites[2].position, None);
        assert_eq!(scenario.sprites[2].actions[1], ActionDescriptor::Unknown);
    }

    #[test]
    fn loads_scenario_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let raw = json!({
            "scenario_version": 1,
            "sprites": [
                { "label": "Owl", "actions": [{ "type": "turnDegrees", "degrees": 45 }] },
                { "position": { "x": 10.0, "y": 20.0 } }
            ]
        });
        write!(file, "{raw}").expect("write");

        let scenario = Scenario::load(file.path()).expect("load");

        assert_eq!(scenario.sprites.len(), 2);
        assert_eq!(scenario.sprites[0].position, None);
        assert_eq!(scenario.sprites[1].label, "");
        assert_eq!(
            scenario.sprites[0].actions,
            vec![ActionDescriptor::turn(45.0)]
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.json");
        let error = Scenario::load(&path).expect_err("missing");
        assert!(matches!(error, ScenarioError::Read { .. }));
        assert!(error.to_string().contains("absent.json"));
    }

    #[test]
    fn parse_errors_name_the_offending_field() {
        let raw = r#"{ "scenario_version": 1, "sprites": [ { "label": "Cat", "actions": [ { "type": "turnDegrees", "degrees": "lots" } ] } ] }"#;
        let error = Scenario::parse(raw).expect_err("bad degrees");
        let message = error.to_string();
        assert!(message.starts_with("parse scenario json at sprites[0].actions[0]"), "{message}");
    }

    #[test]
    fn unknown_block_types_are_kept() {
        let raw = r#"{ "scenario_version": 1, "sprites": [ { "actions": [ { "type": "playSound" } ] } ] }"#;
        let scenario = Scenario::parse(raw).expect("parse");
        assert_eq!(scenario.sprites[0].actions, vec![ActionDescriptor::Unknown]);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases = [
            (
                json!({ "scenario_version": 2, "sprites": [{}] }),
                "scenario_version",
            ),
            (json!({ "scenario_version": 1, "sprites": [] }), "sprites"),
            (
                json!({ "scenario_version": 1, "stage": { "width": 20, "height": 300 }, "sprites": [{}] }),
                "stage.width",
            ),
            (
                json!({ "scenario_version": 1, "sprites": [{ "actions": [
                    { "type": "repeat", "times": 0, "actions": [] }
                ] }] }),
                "sprites[0].actions[0].times",
            ),
            (
                json!({ "scenario_version": 1, "sprites": [{ "actions": [
                    { "type": "sayFor", "text": "hi", "seconds": -1 }
                ] }] }),
                "sprites[0].actions[0].seconds",
            ),
        ];

        for (raw, expected_path) in cases {
            match Scenario::parse(&raw.to_string()) {
                Err(ScenarioError::Invalid { path, .. }) => assert_eq!(path, expected_path),
                other => panic!("expected validation error at {expected_path}, got {other:?}"),
            }
        }
    }

    #[test]
    fn scenario_stage_overrides_fallback_size() {
        let fallback = StageBounds::default();
        assert_eq!(collision_demo().bounds(fallback), StageBounds::new(350.0, 262.0));
        let plain = Scenario {
            stage: None,
            ..collision_demo()
        };
        assert_eq!(plain.bounds(fallback), fallback);
    }

    #[test]
    fn install_adds_sprites_with_queues() {
        let scenario = collision_demo();
        let sandbox = Sandbox::new(stage_engine::EngineConfig {
            bounds: scenario.bounds(StageBounds::default()),
            ..stage_engine::EngineConfig::default()
        });

        let ids = scenario.install(&sandbox).expect("install");

        assert_eq!(ids.len(), 2);
        assert_eq!(sandbox.queue(ids[0]), scenario.sprites[0].actions);
        assert_eq!(sandbox.sprite(ids[1]).expect("dog").position, Vec2::new(270.0, 131.0));
        assert_eq!(sandbox.selected_sprite(), Some(ids[1]));
    }
}
