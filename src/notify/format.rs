use std::fmt::Write;

use crate::models::{Direction, Signal};
use crate::trading::{PerformanceReport, SymbolPerformance};

/// Decimal places scaled to the price magnitude.
pub fn format_price(p: f64) -> String {
    let abs = p.abs();
    if abs >= 1000.0 {
        format!("{:.2}", p)
    } else if abs >= 1.0 {
        format!("{:.4}", p)
    } else {
        format!("{:.6}", p)
    }
}

pub fn format_signal(s: &Signal) -> String {
    let head = match s.direction {
        Direction::Long => "🟢 LONG",
        Direction::Short => "🔴 SHORT",
    };
    let mut out = String::new();
    let _ = writeln!(out, "{} {} ({})", head, s.symbol, s.timeframe);
    let _ = writeln!(out, "Entry: {}", format_price(s.entry_price));
    let _ = writeln!(out, "Stop Loss: {}", format_price(s.stop_loss));
    let _ = writeln!(out, "Take Profit: {}", format_price(s.take_profit));
    let _ = writeln!(out, "R:R 1:{:.2} | Risk {:.1}%", s.risk_reward, s.risk_percent);
    let _ = writeln!(out, "Confidence: {:.1}%", s.confidence * 100.0);
    let _ = writeln!(out, "ATR: {} | Volume x{:.2}", format_price(s.atr), s.volume_ratio);
    let _ = writeln!(
        out,
        "MTF: {}",
        if s.mtf_confirmed { "confirmed" } else { "unconfirmed" }
    );
    if s.high_volatility {
        let _ = writeln!(out, "⚠️ High volatility");
    }
    let _ = write!(out, "{}", s.generated_at.format("%Y-%m-%d %H:%M UTC"));
    out
}

fn perf_line(label: &str, p: &SymbolPerformance) -> String {
    let mut line = format!(
        "{}: {} signals | {} TP / {} SL / {} expired / {} open",
        label, p.emitted, p.hit_target, p.hit_stop, p.expired, p.open
    );
    if p.decided() > 0 {
        let _ = write!(
            line,
            " | WR {:.1}% | avg R {:+.2}",
            p.win_rate * 100.0,
            p.realized_rr
        );
    }
    line
}

pub fn format_report(r: &PerformanceReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📊 Performance report");
    let _ = writeln!(
        out,
        "{} → {}",
        r.period_start.format("%Y-%m-%d %H:%M"),
        r.period_end.format("%Y-%m-%d %H:%M UTC")
    );
    if r.is_empty() {
        let _ = write!(out, "No signals in this period.");
        return out;
    }
    for (symbol, perf) in &r.by_symbol {
        let _ = writeln!(out, "{}", perf_line(symbol, perf));
    }
    let _ = write!(out, "{}", perf_line("Total", &r.total));
    out
}
