// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Configuration of the simulation.
//!
//! Values are layered in increasing priority: the built-in defaults, an
//! optional TOML file and then `SIM_RASTER_` environment variables. Nested
//! fields are separated by a double underscore in environment variables, so
//! `SIM_RASTER_RASTERIZER__STAMPS_CYCLE=8` sets `rasterizer.stamps_cycle`.
//! Command-line arguments are applied on top by the application.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use raster_models::config::RasterizerConfig;
use raster_models::shader_pool::ShaderPoolConfig;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "SIM_RASTER_";

/// The triangles drawn and the register state they are drawn with.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SceneConfig {
    pub triangles: usize,
    pub seed: u64,

    /// Largest extent of a triangle in normalized device coordinates.
    pub max_extent: f32,

    pub width: u32,
    pub height: u32,
    pub cull_back_faces: bool,

    /// MSAA samples per pixel. Multisampling is disabled when below 2.
    pub msaa_samples: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            triangles: 1000,
            seed: 0,
            max_extent: 0.2,
            width: 400,
            height: 400,
            cull_back_faces: true,
            msaa_samples: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SimConfig {
    pub rasterizer: RasterizerConfig,
    pub shader_pool: ShaderPoolConfig,
    pub scene: SceneConfig,
}

impl SimConfig {
    /// Load the configuration from the defaults, `conf_file` and the
    /// environment.
    pub fn load(conf_file: Option<&str>) -> Result<Self, figment::Error> {
        Self::figment(conf_file).extract()
    }

    fn figment(conf_file: Option<&str>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(SimConfig::default()));
        if let Some(conf_file) = conf_file {
            figment = figment.merge(Toml::file(conf_file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
