//! Configuration validation.
//!
//! Validates every recognized key of the `[backtest]`, `[sizing]`,
//! `[loader]` and `[monte_carlo]` sections before anything runs. Missing keys fall back to
//! their defaults; present keys must parse and be in range.

use crate::domain::error::NextbarError;
use crate::domain::monte_carlo::{DEFAULT_SEED, DEFAULT_SIMULATIONS, MAX_SIMULATIONS};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const SLIPPAGE_MODELS: &[&str] = &["proportional", "per_unit"];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    validate_backtest_config(config)?;
    validate_sizing_config(config)?;
    validate_loader_config(config)?;
    validate_monte_carlo_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_min_exposure(config)?;
    validate_risk_free_rate(config)?;
    validate_flags(
        config,
        "backtest",
        &["allow_leverage", "allow_short", "force_liquidate_at_end", "halt_on_bankruptcy"],
    )?;
    date_range(config)?;
    Ok(())
}

pub fn validate_sizing_config(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    for key in ["base_weight", "scale_factor"] {
        let value = number(config, "sizing", key, 1.0)?;
        if value < 0.0 {
            return Err(invalid("sizing", key, format!("{key} must be non-negative")));
        }
    }
    number(config, "sizing", "min_threshold", 0.2)?;
    validate_flags(config, "sizing", &["enabled", "allow_leverage"])
}

pub fn validate_loader_config(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    for key in ["strategies_dir", "store_path"] {
        if let Some(value) = config.get_string("loader", key) {
            if value.trim().is_empty() {
                return Err(invalid("loader", key, format!("{key} must not be empty")));
            }
        }
    }
    Ok(())
}

pub fn validate_monte_carlo_config(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    let simulations = integer(config, "monte_carlo", "simulations", DEFAULT_SIMULATIONS as u64)?;
    if simulations == 0 || simulations > MAX_SIMULATIONS as u64 {
        return Err(invalid(
            "monte_carlo",
            "simulations",
            format!("simulations must be between 1 and {MAX_SIMULATIONS}"),
        ));
    }
    integer(config, "monte_carlo", "seed", DEFAULT_SEED)?;
    validate_flags(config, "monte_carlo", &["enabled"])
}

fn invalid(section: &str, key: &str, reason: String) -> NextbarError {
    NextbarError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

/// A numeric key that must be finite when present.
pub fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, NextbarError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(invalid(section, key, format!("expected a number, got '{raw}'"))),
        },
    }
}

/// A non-negative integer key.
pub fn integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u64,
) -> Result<u64, NextbarError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            invalid(section, key, format!("expected a non-negative integer, got '{raw}'"))
        }),
    }
}

fn validate_flags(config: &dyn ConfigPort, section: &str, keys: &[&str]) -> Result<(), NextbarError> {
    for key in keys {
        if let Some(raw) = config.get_string(section, key) {
            let known = matches!(
                raw.trim().to_lowercase().as_str(),
                "true" | "yes" | "1" | "false" | "no" | "0"
            );
            if !known {
                return Err(invalid(section, key, format!("expected true or false, got '{raw}'")));
            }
        }
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    let value = number(config, "backtest", "initial_capital", 1.0)?;
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    for key in ["commission_rate", "min_commission"] {
        if number(config, "backtest", key, 0.0)? < 0.0 {
            return Err(invalid("backtest", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    let model = config
        .get_string("backtest", "slippage_model")
        .map(|m| m.trim().to_lowercase())
        .unwrap_or_else(|| SLIPPAGE_MODELS[0].to_string());
    if !SLIPPAGE_MODELS.contains(&model.as_str()) {
        return Err(invalid(
            "backtest",
            "slippage_model",
            format!("expected one of {}, got '{model}'", SLIPPAGE_MODELS.join(", ")),
        ));
    }
    let value = number(config, "backtest", "slippage", 0.0)?;
    if value < 0.0 {
        return Err(invalid("backtest", "slippage", "slippage must be non-negative".to_string()));
    }
    if model == "proportional" && value >= 1.0 {
        return Err(invalid(
            "backtest",
            "slippage",
            "proportional slippage must be below 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_min_exposure(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    if number(config, "backtest", "min_exposure", 0.0)? < 0.0 {
        return Err(invalid(
            "backtest",
            "min_exposure",
            "min_exposure must be non-negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), NextbarError> {
    let value = number(config, "backtest", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1".to_string(),
        ));
    }
    Ok(())
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, NextbarError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        invalid(
            "backtest",
            field,
            format!("invalid {} format, expected YYYY-MM-DD", field),
        )
    })
}

/// The optional `start_date`/`end_date` filter.
pub fn date_range(
    config: &dyn ConfigPort,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), NextbarError> {
    let start = config
        .get_string("backtest", "start_date")
        .map(|s| parse_date(&s, "start_date"))
        .transpose()?;
    let end = config
        .get_string("backtest", "end_date")
        .map(|s| parse_date(&s, "end_date"))
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date".to_string(),
            ));
        }
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(result: Result<(), NextbarError>) -> Option<String> {
        match result {
            Err(NextbarError::ConfigInvalid { key, .. }) => Some(key),
            _ => None,
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        assert!(validate_config(&make_config("")).is_ok());
    }

    #[test]
    fn valid_full_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 10000
commission_rate = 0.001
min_commission = 1.0
slippage = 0.0005
slippage_model = proportional
allow_short = true
force_liquidate_at_end = no
min_exposure = 0.001
risk_free_rate = 0.02
start_date = 2020-01-01
end_date = 2024-12-31

[sizing]
enabled = true
base_weight = 1.0
min_threshold = 0.2
scale_factor = 1.0

[loader]
strategies_dir = strategies
store_path = saved.json
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("initial_capital"));
    }

    #[test]
    fn unparseable_number_is_rejected() {
        let config = make_config("[backtest]\ncommission_rate = lots\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("commission_rate"));
    }

    #[test]
    fn negative_min_commission_fails() {
        let config = make_config("[backtest]\nmin_commission = -1\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("min_commission"));
    }

    #[test]
    fn unknown_slippage_model_fails() {
        let config = make_config("[backtest]\nslippage_model = random\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("slippage_model"));
    }

    #[test]
    fn per_unit_slippage_may_exceed_one() {
        let config = make_config("[backtest]\nslippage_model = per_unit\nslippage = 2.5\n");
        assert!(validate_backtest_config(&config).is_ok());
        let config = make_config("[backtest]\nslippage = 2.5\n");
        assert!(validate_backtest_config(&config).is_err());
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = make_config("[backtest]\nrisk_free_rate = 1.5\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("risk_free_rate"));
    }

    #[test]
    fn monte_carlo_section() {
        let config = make_config("[monte_carlo]\nenabled = yes\nsimulations = 500\nseed = 7\n");
        assert!(validate_monte_carlo_config(&config).is_ok());
        assert_eq!(integer(&config, "monte_carlo", "seed", 0).unwrap(), 7);

        for (content, key) in [
            ("[monte_carlo]\nsimulations = 0\n", "simulations"),
            ("[monte_carlo]\nsimulations = 4000000000\n", "simulations"),
            ("[monte_carlo]\nsimulations = 2.5\n", "simulations"),
            ("[monte_carlo]\nseed = -1\n", "seed"),
            ("[monte_carlo]\nenabled = often\n", "enabled"),
        ] {
            assert_eq!(
                invalid_key(validate_config(&make_config(content))).as_deref(),
                Some(key),
                "{content}"
            );
        }
    }

    #[test]
    fn bad_flag_fails() {
        let config = make_config("[backtest]\nallow_short = maybe\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("allow_short"));
        let config = make_config("[backtest]\nhalt_on_bankruptcy = sometimes\n");
        assert_eq!(
            invalid_key(validate_backtest_config(&config)).as_deref(),
            Some("halt_on_bankruptcy")
        );
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\n");
        assert_eq!(invalid_key(validate_backtest_config(&config)).as_deref(), Some("start_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        assert!(date_range(&config).is_err());
    }

    #[test]
    fn open_ended_range() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\n");
        let (start, end) = date_range(&config).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(end, None);
    }

    #[test]
    fn negative_sizing_weight_fails() {
        let config = make_config("[sizing]\nbase_weight = -1\n");
        assert_eq!(invalid_key(validate_sizing_config(&config)).as_deref(), Some("base_weight"));
    }

    #[test]
    fn empty_loader_path_fails() {
        let config = make_config("[loader]\nstrategies_dir =  \n");
        assert_eq!(invalid_key(validate_loader_config(&config)).as_deref(), Some("strategies_dir"));
    }
}
