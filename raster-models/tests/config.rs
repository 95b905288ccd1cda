// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use raster_engine::test_helpers::start_test;
use raster_models::config::{RasterizationStrategy, RasterizerConfig};
use raster_models::shader_pool::{CompletionOrder, ShaderPoolConfig};

fn load<T>(defaults: T, toml: &str) -> Result<T, figment::Error>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    Figment::from(Serialized::defaults(defaults))
        .merge(Toml::string(toml))
        .extract()
}

#[test]
fn empty_file_keeps_defaults() {
    let config = load(RasterizerConfig::default(), "").unwrap();
    assert_eq!(config, RasterizerConfig::default());
}

#[test]
fn file_overrides_fields() {
    let config = load(
        RasterizerConfig::default(),
        r#"
            strategy = "scanline"
            stamps_cycle = 8
            generation_tile = [8, 4]
            shader_setup = true
        "#,
    )
    .unwrap();

    assert_eq!(config.strategy, RasterizationStrategy::Scanline);
    assert_eq!(config.stamps_cycle, 8);
    assert_eq!(config.generation_tile, (8, 4));
    assert!(config.shader_setup);

    // Untouched fields keep their defaults
    let defaults = RasterizerConfig::default();
    assert_eq!(config.setup_fifo_size, defaults.setup_fifo_size);
    assert_eq!(config.scan_tile, defaults.scan_tile);
    assert_eq!(config.effective_batch_size(), 1);
}

#[test]
fn unknown_strategy_rejected() {
    assert!(load(RasterizerConfig::default(), r#"strategy = "zigzag""#).is_err());
}

#[test]
fn completion_order_from_file() {
    let reverse = load(ShaderPoolConfig::default(), r#"order = "reverse""#).unwrap();
    assert_eq!(reverse.order, CompletionOrder::Reverse);
    assert_eq!(reverse.latency, ShaderPoolConfig::default().latency);

    let random = load(
        ShaderPoolConfig::default(),
        r#"
            capacity = 2
            [order.random]
            seed = 42
        "#,
    )
    .unwrap();
    assert_eq!(random.capacity, 2);
    assert_eq!(random.order, CompletionOrder::Random { seed: 42 });
}

#[test]
fn loaded_config_is_validated() {
    let engine = start_test(file!());
    let config = load(RasterizerConfig::default(), "command_latency = 0").unwrap();
    assert_eq!(
        format!("{}", config.validate(engine.top()).err().unwrap()),
        "Error: top: validate: command_latency must be non-zero"
    );
}

#[test]
fn default_config_is_valid() {
    let engine = start_test(file!());
    assert!(RasterizerConfig::default().validate(engine.top()).is_ok());
}
