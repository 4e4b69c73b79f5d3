//! Terminal rendering of run summaries.

#[cfg(feature = "colorized_output")]
use console::style;

use ms2match::matching::FallbackNotice;
use ms2match::results::ResultSet;

fn heading(text: &str) -> String {
    #[cfg(feature = "colorized_output")]
    {
        style(text).bold().cyan().to_string()
    }
    #[cfg(not(feature = "colorized_output"))]
    {
        text.to_string()
    }
}

fn confidence_cell(confidence: f64) -> String {
    let text = format!("{:.3}", confidence);
    #[cfg(feature = "colorized_output")]
    {
        if confidence >= ms2match::results::HIGH_CONFIDENCE_THRESHOLD {
            style(text).green().to_string()
        } else if confidence >= 0.4 {
            style(text).yellow().to_string()
        } else {
            style(text).red().to_string()
        }
    }
    #[cfg(not(feature = "colorized_output"))]
    {
        text
    }
}

pub fn print_fallback(notice: &FallbackNotice) {
    #[cfg(feature = "colorized_output")]
    eprintln!("{} {}", style("WARNING").yellow().bold(), notice);
    #[cfg(not(feature = "colorized_output"))]
    eprintln!("WARNING {}", notice);
}

/// Feature table plus summary block
pub fn print_result_set(results: &ResultSet) {
    println!("{}", heading("Spectral Matches"));
    println!(
        "{:<16} {:>10} {:>8}  {:<32} {:>6} {:>10}",
        "Feature", "m/z", "RT", "Compound", "Score", "Confidence"
    );
    for result in &results.results {
        let (compound, score) = match &result.best_match {
            Some(best) => (
                best.compound_name.as_deref().unwrap_or(&best.library_id).to_string(),
                format!("{:.3}", best.score),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<16} {:>10.4} {:>8.1}  {:<32} {:>6} {:>10}",
            result.feature_name,
            result.precursor_mz,
            result.rt,
            truncate(&compound, 32),
            score,
            confidence_cell(result.confidence)
        );
    }

    let summary = &results.summary;
    println!();
    println!("{}", heading("Summary"));
    println!("  Algorithm:        {}", results.algorithm);
    println!("  Features:         {}", summary.total_features);
    println!(
        "  Matched:          {} ({:.1}%)",
        summary.matched_features,
        summary.match_rate * 100.0
    );
    println!("  High confidence:  {}", summary.high_confidence);
    println!("  Mean confidence:  {:.3}", summary.mean_confidence);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
