use crate::{DecoderCConfig, MffNetError};

#[test]
fn test_default_configuration_is_valid() {
    let config = DecoderCConfig::new();

    assert!(config.validate().is_ok());
    assert_eq!(config.grid_sizes(), [14, 28, 56, 224]);
    assert_eq!(config.input_shape(), [196, 384]);
    assert_eq!(config.skip_shapes(), [[784, 128], [3136, 64]]);
}

#[test]
fn test_img_size_must_be_multiple_of_16() {
    let config = DecoderCConfig::new().with_img_size(200);

    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("multiple of 16"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_coarse_grid_follows_img_size() {
    let config = DecoderCConfig::new().with_img_size(352);

    assert!(config.validate().is_ok());
    assert_eq!(config.input_shape(), [22 * 22, 384]);
}

#[test]
fn test_heads_must_divide_stage_width() {
    let config = DecoderCConfig::new().with_num_heads([1, 2, 3, 8]);

    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("num_heads[2]"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_sr_ratio_must_divide_stage_resolution() {
    // Stage c runs at 56x56.
    let config = DecoderCConfig::new().with_sr_ratios([8, 4, 3, 1]);

    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("sr_ratios[2]"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_qk_ratio_must_keep_heads_whole() {
    let config = DecoderCConfig::new().with_qk_ratio(0);
    assert!(config.validate().is_err());

    let config = DecoderCConfig::new().with_qk_ratio(32);
    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("qk_ratio"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_cross_attention_heads_must_divide_fused_widths() {
    let config = DecoderCConfig::new().with_cross_attn_heads(5);

    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("cross_attn_heads"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_rates_must_be_probabilities() {
    let config = DecoderCConfig::new().with_drop_path_rate(1.0);
    assert!(config.validate().is_err());

    let config = DecoderCConfig::new().with_attn_drop_rate(-0.1);
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_embed_dim_is_rejected() {
    let config = DecoderCConfig::new().with_embed_dims([384, 128, 0, 16]);

    match config.validate() {
        Err(MffNetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("embed_dims[2]"));
        }
        _ => panic!("Expected InvalidConfiguration error"),
    }
}

#[test]
fn test_drop_path_rates_span_all_stages() {
    let config = DecoderCConfig::new().with_drop_path_rate(0.1);
    let rates = config.drop_path_rates();

    assert_eq!(rates.len(), 14);
    assert_eq!(rates[0], 0.0);
    assert!((rates[13] - 0.1).abs() < 1e-12);
    assert!(rates.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_config_roundtrips_through_json() {
    use burn::config::Config;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("decoder.json");

    let config = DecoderCConfig::new()
        .with_img_size(352)
        .with_drop_path_rate(0.1);
    config.save(&path).unwrap();

    let loaded = DecoderCConfig::load(&path).unwrap();
    assert_eq!(loaded.img_size, 352);
    assert_eq!(loaded.embed_dims, config.embed_dims);
    assert_eq!(loaded.drop_path_rate, 0.1);
}
