//! Simulation configuration.
//!
//! Every option maps to one uniform or one scheduler branch. Values arrive from
//! files or hosts unchecked; [`SimulationConfig::validated`] clamps them into a
//! range the engine can run with instead of failing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LayoutError, Result};

/// Space size used when the configured one is unusable.
pub const DEFAULT_SPACE_SIZE: f32 = 4096.0;

/// Smallest space that still yields one quadtree level.
pub const MIN_SPACE_SIZE: f32 = 2.0;

/// Lower bound for the opening-angle threshold.
pub const MIN_REPULSION_THETA: f32 = 0.1;

/// Force-simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Master switch for the force + integration block.
    pub enable_simulation: bool,
    /// Keep ticking while the host reports an active zoom gesture.
    pub enable_simulation_during_zoom: bool,
    /// Side of the square simulation space.
    ///
    /// A backend may run at a smaller power of two than requested: the wgpu
    /// backend halves it until the level pyramid fits one storage binding,
    /// which with default device limits turns 4096 into 2048. Gravity pulls
    /// toward the center of the space actually used, reported by
    /// `Simulation::space_size`.
    pub space_size: f32,
    /// Pull toward the space center.
    pub gravity: f32,
    /// Pull toward the centroid of all points.
    pub center_force: f32,
    /// Many-body repulsion coefficient.
    pub repulsion: f32,
    /// Barnes-Hut opening-angle threshold.
    pub repulsion_theta: f32,
    /// Spring coefficient along links.
    pub link_spring: f32,
    /// Rest length of a link.
    pub link_distance: f32,
    /// Per-link rest length multiplier range `[min, max]`.
    pub link_dist_random_variation_range: [f32; 2],
    /// Pointer repulsion coefficient.
    pub repulsion_from_mouse: f32,
    /// Repel points from the pointer while the right button is held.
    pub enable_right_click_repulsion: bool,
    /// Velocity damping in `[0, 1]`; integration applies `1 - friction`.
    pub friction: f32,
    /// Number of ticks for alpha to cool from 1 to the settle threshold.
    pub decay: f32,
    /// Pull toward cluster centroids (or explicit cluster positions).
    pub cluster_force: f32,
    /// Collision separation coefficient; 0 disables collision.
    pub collision_strength: f32,
    /// Collision radius; 0 derives it from each point's size.
    pub collision_radius: f32,
    /// Point diameter used when no per-point sizes are supplied.
    pub point_size: f32,
    /// Value alpha cools toward.
    pub alpha_target: f32,
    /// Seed for link-distance and centermass jitter.
    pub random_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enable_simulation: true,
            enable_simulation_during_zoom: false,
            space_size: DEFAULT_SPACE_SIZE,
            gravity: 0.25,
            center_force: 0.0,
            repulsion: 1.0,
            repulsion_theta: 1.15,
            link_spring: 1.0,
            link_distance: 10.0,
            link_dist_random_variation_range: [1.0, 1.2],
            repulsion_from_mouse: 2.0,
            enable_right_click_repulsion: false,
            friction: 0.15,
            decay: 1000.0,
            cluster_force: 0.1,
            collision_strength: 0.0,
            collision_radius: 0.0,
            point_size: 4.0,
            alpha_target: 0.0,
            random_seed: 0x9e37_79b9,
        }
    }
}

/// Option names accepted by [`SimulationConfig::get`] and [`SimulationConfig::set`].
pub const OPTION_NAMES: &[&str] = &[
    "enableSimulation",
    "enableSimulationDuringZoom",
    "spaceSize",
    "gravity",
    "centerForce",
    "repulsion",
    "repulsionTheta",
    "linkSpring",
    "linkDistance",
    "linkDistRandomVariationRange",
    "repulsionFromMouse",
    "enableRightClickRepulsion",
    "friction",
    "decay",
    "clusterForce",
    "collisionStrength",
    "collisionRadius",
    "pointSize",
    "alphaTarget",
    "randomSeed",
];

impl SimulationConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Return a copy with every value clamped into a usable range.
    ///
    /// Clamping is logged, never fatal.
    pub fn validated(&self) -> Self {
        let mut config = self.clone();

        if !config.space_size.is_finite() || config.space_size <= 0.0 {
            tracing::warn!(
                "space size {} is not usable, falling back to {}",
                config.space_size,
                DEFAULT_SPACE_SIZE
            );
            config.space_size = DEFAULT_SPACE_SIZE;
        } else if config.space_size < MIN_SPACE_SIZE {
            tracing::warn!(
                "space size {} is below the minimum, clamping to {}",
                config.space_size,
                MIN_SPACE_SIZE
            );
            config.space_size = MIN_SPACE_SIZE;
        }

        if !config.repulsion_theta.is_finite() || config.repulsion_theta < MIN_REPULSION_THETA {
            tracing::warn!(
                "repulsion theta {} clamped to {}",
                config.repulsion_theta,
                MIN_REPULSION_THETA
            );
            config.repulsion_theta = MIN_REPULSION_THETA;
        }

        if !config.friction.is_finite() || !(0.0..=1.0).contains(&config.friction) {
            let clamped = if config.friction.is_finite() {
                config.friction.clamp(0.0, 1.0)
            } else {
                Self::default().friction
            };
            tracing::warn!("friction {} clamped to {}", config.friction, clamped);
            config.friction = clamped;
        }

        if !config.decay.is_finite() || config.decay <= 0.0 {
            tracing::warn!("decay {} is not usable, falling back to 1000", config.decay);
            config.decay = Self::default().decay;
        }

        let [min, max] = config.link_dist_random_variation_range;
        if !min.is_finite() || !max.is_finite() {
            tracing::warn!("link distance variation range is not finite, using [1, 1]");
            config.link_dist_random_variation_range = [1.0, 1.0];
        } else if min > max {
            config.link_dist_random_variation_range = [max, min];
        }

        for (name, value) in [
            ("gravity", &mut config.gravity),
            ("centerForce", &mut config.center_force),
            ("repulsion", &mut config.repulsion),
            ("linkSpring", &mut config.link_spring),
            ("linkDistance", &mut config.link_distance),
            ("repulsionFromMouse", &mut config.repulsion_from_mouse),
            ("clusterForce", &mut config.cluster_force),
            ("collisionStrength", &mut config.collision_strength),
            ("collisionRadius", &mut config.collision_radius),
            ("pointSize", &mut config.point_size),
            ("alphaTarget", &mut config.alpha_target),
        ] {
            if !value.is_finite() {
                tracing::warn!("{} is not finite, using 0", name);
                *value = 0.0;
            }
        }
        if config.collision_radius < 0.0 {
            config.collision_radius = 0.0;
        }

        config
    }

    /// Space size after clamping to what a backend can hold.
    ///
    /// Halves the configured size until it fits `max_space_size`.
    pub fn adjusted_space_size(&self, max_space_size: f32) -> f32 {
        let mut size = self.validated().space_size;
        if size > max_space_size {
            let requested = size;
            while size > max_space_size && size > MIN_SPACE_SIZE {
                size /= 2.0;
            }
            size = size.min(max_space_size).max(MIN_SPACE_SIZE);
            tracing::warn!(
                "space size {} exceeds backend limit {}, using {}",
                requested,
                max_space_size,
                size
            );
        }
        size
    }

    /// Per-tick alpha decay factor `1 - ALPHA_MIN^(1/decay)`.
    pub fn alpha_decay(&self) -> f32 {
        1.0 - crate::ALPHA_MIN.powf(1.0 / self.decay.max(f32::EPSILON))
    }

    /// Get an option value by name.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "enableSimulation" => self.enable_simulation.to_string(),
            "enableSimulationDuringZoom" => self.enable_simulation_during_zoom.to_string(),
            "spaceSize" => self.space_size.to_string(),
            "gravity" => self.gravity.to_string(),
            "centerForce" => self.center_force.to_string(),
            "repulsion" => self.repulsion.to_string(),
            "repulsionTheta" => self.repulsion_theta.to_string(),
            "linkSpring" => self.link_spring.to_string(),
            "linkDistance" => self.link_distance.to_string(),
            "linkDistRandomVariationRange" => format!(
                "{},{}",
                self.link_dist_random_variation_range[0], self.link_dist_random_variation_range[1]
            ),
            "repulsionFromMouse" => self.repulsion_from_mouse.to_string(),
            "enableRightClickRepulsion" => self.enable_right_click_repulsion.to_string(),
            "friction" => self.friction.to_string(),
            "decay" => self.decay.to_string(),
            "clusterForce" => self.cluster_force.to_string(),
            "collisionStrength" => self.collision_strength.to_string(),
            "collisionRadius" => self.collision_radius.to_string(),
            "pointSize" => self.point_size.to_string(),
            "alphaTarget" => self.alpha_target.to_string(),
            "randomSeed" => self.random_seed.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Set an option value by name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "enableSimulation" => self.enable_simulation = parse_bool(key, value)?,
            "enableSimulationDuringZoom" => {
                self.enable_simulation_during_zoom = parse_bool(key, value)?
            }
            "spaceSize" => self.space_size = parse_f32(key, value)?,
            "gravity" => self.gravity = parse_f32(key, value)?,
            "centerForce" => self.center_force = parse_f32(key, value)?,
            "repulsion" => self.repulsion = parse_f32(key, value)?,
            "repulsionTheta" => self.repulsion_theta = parse_f32(key, value)?,
            "linkSpring" => self.link_spring = parse_f32(key, value)?,
            "linkDistance" => self.link_distance = parse_f32(key, value)?,
            "linkDistRandomVariationRange" => {
                let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                let [min, max] = parts.as_slice() else {
                    return Err(LayoutError::Config(format!(
                        "{} expects two comma-separated numbers, got {}",
                        key, value
                    )));
                };
                self.link_dist_random_variation_range =
                    [parse_f32(key, min)?, parse_f32(key, max)?];
            }
            "repulsionFromMouse" => self.repulsion_from_mouse = parse_f32(key, value)?,
            "enableRightClickRepulsion" => {
                self.enable_right_click_repulsion = parse_bool(key, value)?
            }
            "friction" => self.friction = parse_f32(key, value)?,
            "decay" => self.decay = parse_f32(key, value)?,
            "clusterForce" => self.cluster_force = parse_f32(key, value)?,
            "collisionStrength" => self.collision_strength = parse_f32(key, value)?,
            "collisionRadius" => self.collision_radius = parse_f32(key, value)?,
            "pointSize" => self.point_size = parse_f32(key, value)?,
            "alphaTarget" => self.alpha_target = parse_f32(key, value)?,
            "randomSeed" => {
                self.random_seed = value
                    .parse()
                    .map_err(|_| LayoutError::Config(format!("Invalid integer for {}: {}", key, value)))?
            }
            _ => return Err(LayoutError::Config(format!("Unknown option: {}", key))),
        }
        Ok(())
    }
}

fn parse_f32(key: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse()
        .map_err(|_| LayoutError::Config(format!("Invalid number for {}: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(LayoutError::Config(format!(
            "Invalid boolean for {}: {}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_space_size_falls_back() {
        let config = SimulationConfig {
            space_size: f32::NAN,
            ..Default::default()
        };
        assert_eq!(config.validated().space_size, DEFAULT_SPACE_SIZE);

        let config = SimulationConfig {
            space_size: -10.0,
            ..Default::default()
        };
        assert_eq!(config.validated().space_size, DEFAULT_SPACE_SIZE);
    }

    #[test]
    fn test_space_size_halves_to_limit() {
        let config = SimulationConfig {
            space_size: 8192.0,
            ..Default::default()
        };
        assert_eq!(config.adjusted_space_size(2048.0), 2048.0);
        assert_eq!(config.adjusted_space_size(16384.0), 8192.0);
    }

    #[test]
    fn test_get_set_round_trip_by_option_name() {
        let mut config = SimulationConfig::default();
        config.set("repulsionTheta", "0.8").unwrap();
        config.set("linkDistRandomVariationRange", "1, 1").unwrap();
        config.set("enableRightClickRepulsion", "true").unwrap();
        assert_eq!(config.repulsion_theta, 0.8);
        assert_eq!(config.link_dist_random_variation_range, [1.0, 1.0]);
        assert!(config.enable_right_click_repulsion);
        assert_eq!(config.get("repulsionTheta").as_deref(), Some("0.8"));

        for name in OPTION_NAMES {
            assert!(config.get(name).is_some(), "{} has no getter", name);
        }
    }

    #[test]
    fn test_set_rejects_unknown_and_malformed() {
        let mut config = SimulationConfig::default();
        assert!(matches!(
            config.set("warpDrive", "1"),
            Err(LayoutError::Config(_))
        ));
        assert!(config.set("gravity", "lots").is_err());
        assert!(config.set("linkDistRandomVariationRange", "1").is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"gravity": 0.5}"#).unwrap();
        assert_eq!(config.gravity, 0.5);
        assert_eq!(config.decay, 1000.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let config = SimulationConfig {
            repulsion: 3.0,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SimulationConfig::load(&path).unwrap(), config);
    }
}
