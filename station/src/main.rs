//! Demo driver binary for the `gsm-l3` engine: loads a config file, builds
//! one `Ms` instance, and ticks it against a fake L1 harness so the full
//! cell-selection → PLMN-selection → mobility-management pipeline can be
//! observed end to end without real radio hardware.

mod config;
mod error;
mod fake_l1;

use std::path::PathBuf;

use clap::Parser;
use log::{info, warn, LevelFilter};

use gsm_l3::cellsel::{next_scan_batch, CsEvent, ScanLimits};
use gsm_l3::freqtable::ArfcnFlags;
use gsm_l3::message::CcchMode;
use gsm_l3::ms::{Ms, MsEvent};
use gsm_l3::subscriber::Subscriber;

use crate::config::{parse_config, Config};
use crate::error::StationError;
use crate::fake_l1::FakeL1;

#[derive(Parser, Debug)]
#[command(version, about = "Drive a gsm-l3 mobile-station instance against a fake L1")]
struct Args {
    /// Path to the station's TOML config file. If it can't be read, the
    /// built-in defaults are used.
    #[arg(short, long, default_value = "gsm-l3-station.toml")]
    config: PathBuf,
}

fn init_logging(debug_mode: bool) {
    let level = if debug_mode {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn build_ms(config: &Config) -> Ms {
    let mut subscriber = Subscriber::new(config.imsi.clone());
    subscriber.tmsi = config.tmsi;
    subscriber.access_classes = config.access_classes;
    subscriber.always_search_hplmn = config.always_search_hplmn;
    subscriber.t6m_hplmn = config.t6m_hplmn;
    Ms::new(subscriber)
}

/// First ARFCN index with a measured signal above threshold but no sync
/// attempt yet, the candidate `cellsel::select` would need an existing
/// `SysInfo` to consider — the very first sync target has to come from the
/// raw scan result instead.
fn pick_sync_target(ms: &Ms) -> Option<usize> {
    ms.freq_table
        .iter()
        .find(|(_, entry)| {
            entry.flags.contains(ArfcnFlags::SUPPORT | ArfcnFlags::SIGNAL)
                && !entry.flags.contains(ArfcnFlags::BARRED)
        })
        .map(|(index, _)| index)
}

/// Drive the dispatch loop through one cold-start camp attempt (PLMN
/// search → power scan → sync-and-read), then tick the timer wheel
/// forward until the configured tick budget runs out or MM reaches
/// NORMAL_SERVICE.
fn run_demo(ms: &mut Ms, fake_l1: &FakeL1, config: &Config) {
    fake_l1.mark_supported(ms);

    ms.enqueue(MsEvent::Cs(CsEvent::PlmnSearchRequest { target: None }));
    ms.run();

    let batch = next_scan_batch(&ms.freq_table, false, ScanLimits::default());
    if !batch.indices.is_empty() {
        ms.start_power_scan(&batch.indices);
        fake_l1.service_uplink(ms);
        ms.run();
    }

    if let Some(index) = pick_sync_target(ms) {
        ms.start_sync(index, CcchMode::NonCombined);
        fake_l1.service_uplink(ms);
        ms.run();
    } else {
        warn!("no ARFCN with a measured signal; nothing to camp on");
    }

    for tick in 0..config.max_ticks {
        fake_l1.service_uplink(ms);
        ms.run();
        ms.tick(config.tick_secs);
        ms.run();

        info!(
            "tick {tick}: cs={:?} mm={:?} plmn={:?}",
            ms.cs.state,
            ms.mm.state,
            ms.plmn.state()
        );

        if let gsm_l3::mm::MmState::MmIdle(gsm_l3::mm::MmIdleSubstate::NormalService) = ms.mm.state
        {
            info!("reached NORMAL_SERVICE after {tick} ticks");
            return;
        }
    }
    warn!(
        "exhausted {} ticks without reaching NORMAL_SERVICE (final mm state: {:?})",
        config.max_ticks, ms.mm.state
    );
}

fn main() -> Result<(), StationError> {
    let args = Args::parse();
    let config = parse_config(&args.config)?;
    init_logging(config.debug_mode);

    info!(
        "starting gsm-l3-station for IMSI {} at {}",
        config.imsi,
        chrono::Local::now().to_rfc3339()
    );

    let mut ms = build_ms(&config);
    let fake_l1 = FakeL1::new(&config.fake_arfcns);
    run_demo(&mut ms, &fake_l1, &config);

    Ok(())
}
