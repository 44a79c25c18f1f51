//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_strategy_store::JsonStrategyStore;
use crate::adapters::strategy_dir_adapter::StrategyDirAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestResult, EngineConfig};
use crate::domain::config_validation::{self, date_range, validate_config};
use crate::domain::error::{LoadError, NextbarError};
use crate::domain::execution::SlippageModel;
use crate::domain::loader::{self, LoadedStrategy};
use crate::domain::metrics::{DEFAULT_RISK_FREE_RATE, Metrics};
use crate::domain::monte_carlo::{self, MonteCarloConfig, MonteCarloResult};
use crate::domain::security::Diagnostic;
use crate::domain::signal::SignalTable;
use crate::domain::sizing::{PositionSizer, SentimentSizer};
use crate::domain::strategies;
use crate::domain::strategy::{Construction, ParamValue, StrategyParams};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::strategy_store_port::StrategyStorePort;

pub const DEFAULT_STRATEGIES_DIR: &str = "strategies";
pub const DEFAULT_STORE_PATH: &str = "strategies.json";

#[derive(Parser, Debug)]
#[command(name = "nextbar", about = "Look-ahead-safe strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over a CSV price file
    Backtest {
        /// Price file with date,open,high,low,close[,volume][,sentiment]
        #[arg(short, long)]
        data: PathBuf,
        /// Registered strategy name (preset, built-in module or script module)
        #[arg(short, long, group = "strategy_source")]
        strategy: Option<String>,
        /// Strategy script file
        #[arg(long, group = "strategy_source")]
        source: Option<PathBuf>,
        /// Strategy saved in the store
        #[arg(long, group = "strategy_source")]
        saved: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Strategy parameter as name=value, repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Print the full result as JSON on stdout
        #[arg(long)]
        json: bool,
        /// Resample closed trades after the run, even if `[monte_carlo]` is off
        #[arg(long)]
        monte_carlo: bool,
    },
    /// Vet and load a strategy script without running it
    Check {
        file: PathBuf,
    },
    /// List loadable strategies
    List {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Vet a strategy script and save it under a name
    Save {
        name: String,
        file: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            data,
            strategy,
            source,
            saved,
            config,
            params,
            start,
            end,
            json,
            monte_carlo,
        } => {
            let selection = match (strategy, source, saved) {
                (Some(name), _, _) => Selection::Name(name),
                (_, Some(path), _) => Selection::File(path),
                (_, _, Some(name)) => Selection::Saved(name),
                (None, None, None) => {
                    eprintln!("error: one of --strategy, --source or --saved is required");
                    return ExitCode::from(2);
                }
            };
            let request = BacktestRequest {
                data,
                selection,
                params: params.into_iter().collect(),
                start,
                end,
                json,
                monte_carlo,
            };
            run_backtest(config.as_deref(), &request)
        }
        Command::Check { file } => run_check(&file),
        Command::List { config } => run_list(config.as_deref()),
        Command::Save { name, file, config } => run_save(config.as_deref(), &name, &file),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// `name=value`, with the value read by [`ParamValue::parse_literal`].
pub fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((name.to_string(), ParamValue::parse_literal(value)))
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, NextbarError> {
    let adapter = match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path)?
        }
        None => FileConfigAdapter::empty(),
    };
    validate_config(&adapter)?;
    Ok(adapter)
}

pub fn build_engine_config(adapter: &dyn ConfigPort) -> Result<EngineConfig, NextbarError> {
    let defaults = EngineConfig::default();
    let number = |key: &str, default: f64| config_validation::number(adapter, "backtest", key, default);

    let slippage_amount = number("slippage", defaults.slippage.amount())?;
    let slippage = match adapter
        .get_string("backtest", "slippage_model")
        .map(|m| m.trim().to_lowercase())
        .as_deref()
    {
        Some("per_unit") => SlippageModel::PerUnit(slippage_amount),
        _ => SlippageModel::Proportional(slippage_amount),
    };

    Ok(EngineConfig {
        initial_capital: number("initial_capital", defaults.initial_capital)?,
        commission_rate: number("commission_rate", defaults.commission_rate)?,
        min_commission: number("min_commission", defaults.min_commission)?,
        slippage,
        allow_leverage: adapter.get_bool("backtest", "allow_leverage", defaults.allow_leverage),
        allow_short: adapter.get_bool("backtest", "allow_short", defaults.allow_short),
        force_liquidate_at_end: adapter.get_bool(
            "backtest",
            "force_liquidate_at_end",
            defaults.force_liquidate_at_end,
        ),
        min_exposure: number("min_exposure", defaults.min_exposure)?,
        halt_on_bankruptcy: adapter.get_bool(
            "backtest",
            "halt_on_bankruptcy",
            defaults.halt_on_bankruptcy,
        ),
    })
}

/// The sentiment sizing overlay, when `[sizing] enabled` is set.
pub fn build_sizer(
    adapter: &dyn ConfigPort,
    engine: &EngineConfig,
) -> Result<Option<SentimentSizer>, NextbarError> {
    if !adapter.get_bool("sizing", "enabled", false) {
        return Ok(None);
    }
    let defaults = SentimentSizer::default();
    let number = |key: &str, default: f64| config_validation::number(adapter, "sizing", key, default);
    let sizer = SentimentSizer::new(
        number("base_weight", 1.0)?,
        number("min_threshold", defaults.min_threshold())?,
        number("scale_factor", 1.0)?,
        adapter.get_bool("sizing", "allow_leverage", engine.allow_leverage),
    )?;
    Ok(Some(sizer))
}

/// Trade resampling settings, when `[monte_carlo] enabled` is set or `forced`.
pub fn build_monte_carlo_config(
    adapter: &dyn ConfigPort,
    forced: bool,
) -> Result<Option<MonteCarloConfig>, NextbarError> {
    if !forced && !adapter.get_bool("monte_carlo", "enabled", false) {
        return Ok(None);
    }
    let defaults = MonteCarloConfig::default();
    let simulations =
        config_validation::integer(adapter, "monte_carlo", "simulations", defaults.simulations as u64)?;
    Ok(Some(MonteCarloConfig {
        simulations: usize::try_from(simulations).unwrap_or(monte_carlo::MAX_SIMULATIONS),
        seed: config_validation::integer(adapter, "monte_carlo", "seed", defaults.seed)?,
    }))
}

pub fn strategies_dir(adapter: &dyn ConfigPort) -> PathBuf {
    PathBuf::from(
        adapter
            .get_string("loader", "strategies_dir")
            .unwrap_or_else(|| DEFAULT_STRATEGIES_DIR.to_string()),
    )
}

pub fn store_path(adapter: &dyn ConfigPort) -> PathBuf {
    PathBuf::from(
        adapter
            .get_string("loader", "store_path")
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
    )
}

#[derive(Debug, Clone)]
pub enum Selection {
    Name(String),
    File(PathBuf),
    Saved(String),
}

#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub data: PathBuf,
    pub selection: Selection,
    pub params: StrategyParams,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub json: bool,
    pub monte_carlo: bool,
}

/// Loads the selected strategy and binds `params` to it.
pub fn select_strategy(
    adapter: &dyn ConfigPort,
    selection: &Selection,
    params: &StrategyParams,
) -> Result<LoadedStrategy, NextbarError> {
    let from_text = |text: &str| -> Result<LoadedStrategy, NextbarError> {
        let mut loaded = loader::load_from_source(text)?;
        if !params.is_empty() {
            loaded.strategy = loaded.handle.instantiate(params)?;
        }
        Ok(loaded)
    };

    match selection {
        Selection::Name(name) => {
            let sources = StrategyDirAdapter::new(strategies_dir(adapter));
            Ok(loader::load_from_name(name, &sources, params)?)
        }
        Selection::File(path) => {
            eprintln!("Loading strategy from {}", path.display());
            from_text(&fs::read_to_string(path)?)
        }
        Selection::Saved(name) => {
            let store = JsonStrategyStore::new(store_path(adapter));
            let text = store.load(name)?.ok_or_else(|| LoadError::NotFound {
                name: name.clone(),
            })?;
            from_text(&text)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BacktestReport<'a> {
    pub strategy: &'a str,
    pub params: &'a StrategyParams,
    pub config: &'a EngineConfig,
    pub metrics: &'a Metrics,
    pub result: &'a BacktestResult,
    pub diagnostics: &'a [Diagnostic],
    pub monte_carlo: Option<&'a MonteCarloResult>,
}

/// Loads data and strategy, generates signals and runs the engine.
pub fn run_pipeline(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
    request: &BacktestRequest,
) -> Result<(LoadedStrategy, EngineConfig, BacktestResult), NextbarError> {
    let engine_config = build_engine_config(adapter)?;
    let sizer = build_sizer(adapter, &engine_config)?;

    let (config_start, config_end) = date_range(adapter)?;
    let start = request.start.or(config_start);
    let end = request.end.or(config_end);
    let table = data_port.fetch_table(&request.data, start, end)?;
    if table.is_empty() {
        return Err(NextbarError::Data {
            reason: format!("no price rows in {} for the requested range", request.data.display()),
        });
    }

    let loaded = select_strategy(adapter, &request.selection, &request.params)?;
    eprintln!(
        "Running {} ({}) over {} bars",
        loaded.strategy.name(),
        loaded.handle.origin(),
        table.len()
    );

    let mut signals: SignalTable = loaded.strategy.generate_signals(&table)?;
    if let Some(sizer) = sizer {
        if signals.target_size.is_none() {
            signals.target_size = Some(sizer.get_target_weights(&table.sentiment()));
        }
    }

    let result = backtest_engine::run_backtest(&table, &signals, &engine_config)?;
    Ok((loaded, engine_config, result))
}

pub fn run_backtest(config_path: Option<&Path>, request: &BacktestRequest) -> Result<(), NextbarError> {
    let adapter = load_config(config_path)?;
    let (loaded, engine_config, result) = run_pipeline(&adapter, &CsvAdapter::new(), request)?;

    let risk_free_rate =
        config_validation::number(&adapter, "backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE)?;
    let metrics = Metrics::compute(&result, engine_config.initial_capital, risk_free_rate);
    let simulation = match build_monte_carlo_config(&adapter, request.monte_carlo)? {
        Some(mc) => {
            let simulation = monte_carlo::from_backtest(&result, engine_config.initial_capital, &mc);
            if simulation.is_none() {
                eprintln!("Monte Carlo skipped: no closed trades to resample");
            }
            simulation
        }
        None => None,
    };

    if request.json {
        let report = BacktestReport {
            strategy: loaded.strategy.name(),
            params: loaded.strategy.params(),
            config: &engine_config,
            metrics: &metrics,
            result: &result,
            diagnostics: &loaded.diagnostics,
            monte_carlo: simulation.as_ref(),
        };
        let json = serde_json::to_string_pretty(&report).map_err(|e| NextbarError::Data {
            reason: format!("failed to serialize report: {e}"),
        })?;
        println!("{json}");
    }

    eprintln!("\n=== Results: {} ===", loaded.strategy.name());
    eprintln!("Final Equity:     {:.2}", result.final_state.equity);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("CAGR:             {:.2}%", metrics.cagr * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Closed Trades:    {}", metrics.total_trades());
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Avg Exposure:     {:.1}%", metrics.avg_exposure * 100.0);
    if let Some(open) = result.open_trade() {
        eprintln!(
            "Open Position:    {:.4} @ {:.4} since {}",
            open.quantity, open.entry_price, open.entry_date
        );
    }
    if let Some(date) = result.bankrupt_on {
        eprintln!("Bankrupt:         {date}, run halted");
    }
    if let Some(mc) = &simulation {
        eprintln!("\n=== Monte Carlo: {} paths over {} trades ===", mc.simulations, mc.trades);
        eprintln!("Final Equity P5:  {:.2}", mc.p5_final);
        eprintln!("Final Equity P50: {:.2}", mc.p50.last().copied().unwrap_or_default());
        eprintln!("Final Equity P95: {:.2}", mc.p95.last().copied().unwrap_or_default());
        eprintln!("VaR (95%):        {:.2}", mc.var_95);
        eprintln!("Median Drawdown:  -{:.1}%", mc.median_drawdown * 100.0);
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("  warning: {d}");
    }
}

/// Vets `text` and reports load errors with the offending line.
fn vet_source(text: &str) -> Result<LoadedStrategy, NextbarError> {
    loader::load_from_source(text).map_err(|e| {
        if let LoadError::Syntax(p) | LoadError::TruncatedInput(p) = &e {
            eprintln!("{}", p.display_with_context(text));
        }
        NextbarError::from(e)
    })
}

pub fn run_check(file: &Path) -> Result<(), NextbarError> {
    let text = fs::read_to_string(file)?;
    let loaded = vet_source(&text)?;
    print_diagnostics(&loaded.diagnostics);

    println!("OK: {}", loaded.strategy.name());
    for (name, value) in loaded.strategy.params().iter() {
        println!("  {name} = {value}");
    }
    Ok(())
}

pub fn run_list(config_path: Option<&Path>) -> Result<(), NextbarError> {
    let adapter = load_config(config_path)?;

    println!("Presets:");
    for d in strategies::PRESETS.iter() {
        let fields = match &d.construction {
            Construction::LegacyFields { fields, .. } => fields.join(", "),
            Construction::Options(_) => String::new(),
        };
        println!("  {:<28} {} [{}]", d.name, d.summary, fields);
    }

    println!("Built-in modules:");
    for d in strategies::MODULES.iter() {
        println!(
            "  {:<28} {} ({})",
            d.module.unwrap_or(d.name),
            d.summary,
            d.name
        );
    }

    let dir = strategies_dir(&adapter);
    let modules = StrategyDirAdapter::new(dir.clone()).list_modules()?;
    println!("Scripts in {}:", dir.display());
    for module in &modules {
        println!("  {module}");
    }

    let store = JsonStrategyStore::new(store_path(&adapter));
    println!("Saved in {}:", store.path().display());
    for name in store.list()? {
        println!("  {name}");
    }
    Ok(())
}

pub fn run_save(config_path: Option<&Path>, name: &str, file: &Path) -> Result<(), NextbarError> {
    let adapter = load_config(config_path)?;
    let text = fs::read_to_string(file)?;
    let loaded = vet_source(&text)?;
    print_diagnostics(&loaded.diagnostics);

    let store = JsonStrategyStore::new(store_path(&adapter));
    store.save(name, &text)?;
    println!("Saved {} as '{}'", loaded.strategy.name(), name);
    Ok(())
}
