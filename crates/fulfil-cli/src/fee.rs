//! # Fee Subcommand
//!
//! Prices a parcel the way the orchestrator would, without touching any
//! balance.
//!
//! ```bash
//! fulfil fee --weight-grams 1200 --insured --cod-amount 35000
//! fulfil fee --weight-grams 1200 --schedule config/fees.yaml --json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fulfil_core::{Amount, CodInfo};
use fulfil_fees::{FeeBreakdown, FeeSchedule};

/// Arguments for the fee subcommand.
#[derive(Args, Debug)]
pub struct FeeArgs {
    /// Parcel weight in grams.
    #[arg(long)]
    pub weight_grams: u32,

    /// Add the insurance surcharge.
    #[arg(long)]
    pub insured: bool,

    /// Cash-on-delivery amount in minor units. Omit for no COD.
    #[arg(long)]
    pub cod_amount: Option<i64>,

    /// YAML fee schedule. Defaults to the built-in schedule.
    #[arg(long)]
    pub schedule: Option<PathBuf>,

    /// Print the breakdown as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Price the parcel described by `args`.
pub fn compute(args: &FeeArgs) -> Result<FeeBreakdown> {
    let schedule = match &args.schedule {
        Some(path) => FeeSchedule::from_path(path)
            .with_context(|| format!("loading fee schedule {}", path.display()))?,
        None => FeeSchedule::default(),
    };
    let cod = args
        .cod_amount
        .map_or(CodInfo::NONE, |a| CodInfo::collect(Amount::from_minor(a)));
    let fee = schedule.price(args.weight_grams, args.insured, cod, None)?;
    Ok(fee)
}

/// Execute the fee subcommand.
pub fn run_fee(args: &FeeArgs) -> Result<u8> {
    let fee = compute(args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&fee)?);
        return Ok(0);
    }
    println!("base rate   {:>10}", fee.base_rate.to_major_string());
    println!("insurance   {:>10}", fee.insurance.to_major_string());
    println!("cod fee     {:>10}", fee.cod_fee.to_major_string());
    println!("platform    {:>10}", fee.platform_fee.to_major_string());
    println!("total       {:>10}", fee.total.to_major_string());
    Ok(0)
}
