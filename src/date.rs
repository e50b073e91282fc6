//! Best-effort EXTH publishing-date parsing: ISO-8601, then a bare
//! year, then the current time as a last resort. The fallback chain never
//! fails the overall read — only logged.
//!
//! The conversions here are plain calendar arithmetic (Howard Hinnant's
//! civil-calendar algorithm) so the core parser works without the optional
//! `chrono` dependency; the `time` feature only adds a `NaiveDateTime` view
//! on top, gated the same way as this crate's other optional datetime
//! convenience accessors.

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (i64::from(m) + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

fn parse_iso8601(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (date_part, time_part) = match raw.find(['T', ' ']) {
        Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
        None => (raw, None),
    };

    let mut parts = date_part.splitn(3, '-');
    let y: i64 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let d: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    let mut seconds = days_from_civil(y, m, d) * 86_400;

    if let Some(t) = time_part {
        let t = t.trim_end_matches('Z');
        let t = t.split(['+', '-']).next().unwrap_or(t);
        let mut tp = t.splitn(3, ':');
        let hh: i64 = tp.next().unwrap_or("0").parse().ok()?;
        let mm: i64 = tp.next().unwrap_or("0").parse().ok()?;
        let ss: i64 = tp.next().unwrap_or("0").parse().unwrap_or(0);
        seconds += hh * 3600 + mm * 60 + ss;
    }
    Some(seconds)
}

fn parse_year_only(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let y: i64 = trimmed.parse().ok()?;
        return Some(days_from_civil(y, 1, 1) * 86_400);
    }
    None
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parses a raw EXTH publishing-date string, falling back through
/// progressively looser formats and finally the current time.
pub(crate) fn parse_publish_date(raw: &str) -> i64 {
    if let Some(ts) = parse_iso8601(raw) {
        return ts;
    }
    if let Some(ts) = parse_year_only(raw) {
        log::debug!("publishing date {:?} only parsed as a bare year", raw);
        return ts;
    }
    log::debug!("publishing date {:?} unparseable, defaulting to current time", raw);
    current_unix_time()
}

/// Renders a unix timestamp back to the ISO-8601 form this crate writes.
pub(crate) fn format_publish_date(ts: i64) -> String {
    let (y, m, d) = civil_from_days(ts.div_euclid(86_400));
    let secs_of_day = ts.rem_euclid(86_400);
    let (hh, mm, ss) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);
    format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z", y, m, d, hh, mm, ss)
}

#[cfg(feature = "time")]
pub(crate) fn to_naive_datetime(ts: i64) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::from_timestamp(ts, 0)
}
