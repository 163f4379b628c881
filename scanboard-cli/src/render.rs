//! Text rendering of scan results, history and the dashboard

use scanboard_core::dashboard::{format_file_size, Dashboard};
use scanboard_core::history::ScanRecord;
use scanboard_core::{Config, ScanOutcome};

const BAR_WIDTH: usize = 30;

pub fn redacted_config_json(config: &Config) -> anyhow::Result<String> {
    let mut shown = config.clone();
    shown.api_key = shown
        .api_key
        .as_ref()
        .map(|k| format!("<redacted len={}>", k.len()));
    Ok(serde_json::to_string_pretty(&shown)?)
}

fn verdict(record: &ScanRecord) -> &'static str {
    if record.is_infected {
        "INFECTED"
    } else {
        "clean"
    }
}

pub fn print_outcome(outcome: &ScanOutcome) {
    let record = &outcome.record;
    println!("{}", record.file_name);
    println!(
        "  type: {}   size: {}",
        record.file_type,
        format_file_size(record.file_size)
    );
    println!(
        "  verdict: {}   threat level: {}   detection rate: {:.2}%",
        verdict(record),
        record.threat_level,
        record.detection_rate
    );

    if let Some(vt) = &record.engine_results.virustotal {
        println!("  reputation: {}/{} engines", vt.positives, vt.total);
        if !vt.detected_by.is_empty() {
            println!("    detected by: {}", vt.detected_by.join(", "));
        }
        if let Some(meta) = &vt.metadata {
            if let Some(url) = &meta.final_url {
                println!("    final url: {}", url);
            }
            if let Some(ip) = &meta.server_ip {
                println!("    server ip: {}", ip);
            }
            if let Some(categories) = &meta.categories {
                println!("    categories: {}", categories.join(", "));
            }
            if let Some(sha) = &meta.body_sha256 {
                println!("    sha256: {}", sha);
            }
            if let Some(first) = &meta.first_submission {
                println!("    first submitted: {}", first);
            }
        }
    }
    if let Some(ml) = outcome.ml() {
        print!("  ml: {:.1}% confidence", ml.confidence);
        match &ml.malware_type {
            Some(kind) => println!(", {}", kind),
            None => println!(),
        }
    }
    if outcome.persist_error.is_some() {
        println!("  (not saved to history)");
    }
}

pub fn print_history(records: &[&ScanRecord]) {
    if records.is_empty() {
        println!("No scans yet.");
        return;
    }
    for record in records {
        println!(
            "{}  {:<10} {:<8} {:>7.2}%  {:<6}  {}  ({})",
            record.scan_date.format("%Y-%m-%d %H:%M"),
            record.scan_engine,
            verdict(record),
            record.detection_rate,
            record.threat_level,
            record.file_name,
            format_file_size(record.file_size)
        );
    }
}

pub fn print_dashboard(dashboard: &Dashboard, records: &[ScanRecord]) {
    let stats = &dashboard.stats;
    println!("Total scans:     {}", stats.total_scans);
    match stats.malicious_percent() {
        Some(pct) => println!("Malicious files: {} ({}% of total)", stats.malicious_files, pct),
        None => println!("Malicious files: 0"),
    }
    println!("Clean files:     {}", stats.clean_files);
    match stats.last_scan_date {
        Some(date) => println!("Last scan:       {}", date.format("%b %-d %H:%M")),
        None => println!("Last scan:       N/A"),
    }

    println!();
    println!("Engines");
    println!("  virustotal: {}", dashboard.engines.virus_total_scans);
    println!("  ml:         {}", dashboard.engines.ml_scans);
    println!("  both:       {}", dashboard.engines.both_scans);

    println!();
    println!("Detections by month");
    let peak = dashboard
        .monthly
        .iter()
        .map(|b| b.clean + b.infected)
        .max()
        .unwrap_or(0)
        .max(1);
    for bucket in &dashboard.monthly {
        let clean = bucket.clean * BAR_WIDTH / peak;
        let infected = bucket.infected * BAR_WIDTH / peak;
        println!(
            "  {} {:<width$} clean {:>3}  infected {:>3}",
            bucket.month_label,
            format!("{}{}", "#".repeat(infected), ".".repeat(clean)),
            bucket.clean,
            bucket.infected,
            width = BAR_WIDTH
        );
    }

    println!();
    println!("Recent scans");
    print_history(&scanboard_core::dashboard::recent(records, 5));
}
