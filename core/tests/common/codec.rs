// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! A line-oriented codec standing in for the external RFC 5545 parser.
//!
//! It understands exactly the subset the sync core cares about: UID,
//! RECURRENCE-ID, SEQUENCE, DTSTAMP and the payload comparison fields,
//! plus calendar-level `X-` properties. Round-trips through
//! `generate`/`parse` preserve all of them.

use davsync_caldav::{CalendarEvent, DavError, IcalCodec, ParsedCalendar};

#[derive(Debug)]
pub struct LineCodec;

impl IcalCodec for LineCodec {
    fn parse(&self, ics: &str) -> Result<ParsedCalendar, DavError> {
        if !ics.contains("BEGIN:VCALENDAR") {
            return Err(DavError::Ical("missing VCALENDAR".to_string()));
        }

        let mut parsed = ParsedCalendar::default();
        let mut current: Option<CalendarEvent> = None;
        for line in ics.lines() {
            let line = line.trim_end();
            if line == "BEGIN:VEVENT" {
                current = Some(CalendarEvent::default());
                continue;
            }
            if line == "END:VEVENT" {
                if let Some(event) = current.take() {
                    parsed.events.push(event);
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.split(';').next().unwrap_or(name);
            match current.as_mut() {
                Some(event) => match name {
                    "UID" => event.uid = value.to_string(),
                    "RECURRENCE-ID" => event.recurrence_id = Some(value.to_string()),
                    "SEQUENCE" => event.sequence = value.parse().unwrap_or(0),
                    "DTSTAMP" => event.dtstamp_ms = parse_utc_ms(value),
                    "SUMMARY" => event.summary = Some(value.to_string()),
                    "DESCRIPTION" => event.description = Some(value.to_string()),
                    "LOCATION" => event.location = Some(value.to_string()),
                    "DTSTART" => event.dt_start = Some(value.to_string()),
                    "DTEND" => event.dt_end = Some(value.to_string()),
                    "RRULE" => event.rrule = Some(value.to_string()),
                    _ => {}
                },
                None => {
                    parsed
                        .properties
                        .insert(name.to_string(), value.to_string());
                }
            }
        }
        Ok(parsed)
    }

    fn generate(&self, event: &CalendarEvent) -> Result<String, DavError> {
        if event.uid.is_empty() {
            return Err(DavError::Ical("event has no UID".to_string()));
        }

        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", event.uid),
            format!("SEQUENCE:{}", event.sequence),
        ];
        if let Some(ms) = event.dtstamp_ms {
            lines.push(format!("DTSTAMP:{}", format_utc_ms(ms)));
        }
        if let Some(rid) = &event.recurrence_id {
            lines.push(format!("RECURRENCE-ID:{rid}"));
        }
        if let Some(summary) = &event.summary {
            lines.push(format!("SUMMARY:{summary}"));
        }
        if let Some(description) = &event.description {
            lines.push(format!("DESCRIPTION:{description}"));
        }
        if let Some(location) = &event.location {
            lines.push(format!("LOCATION:{location}"));
        }
        if let Some(start) = &event.dt_start {
            lines.push(format!("DTSTART:{start}"));
        }
        if let Some(end) = &event.dt_end {
            lines.push(format!("DTEND:{end}"));
        }
        if let Some(rrule) = &event.rrule {
            lines.push(format!("RRULE:{rrule}"));
        }
        lines.push("END:VEVENT".to_string());
        lines.push("END:VCALENDAR".to_string());
        Ok(lines.join("\r\n") + "\r\n")
    }
}

/// Parses `YYYYMMDDTHHMMSSZ` into epoch milliseconds.
pub fn parse_utc_ms(value: &str) -> Option<i64> {
    let dt = jiff::civil::DateTime::strptime("%Y%m%dT%H%M%SZ", value).ok()?;
    let zoned = dt.to_zoned(jiff::tz::TimeZone::UTC).ok()?;
    Some(zoned.timestamp().as_millisecond())
}

/// Formats epoch milliseconds as `YYYYMMDDTHHMMSSZ`.
pub fn format_utc_ms(ms: i64) -> String {
    match jiff::Timestamp::from_millisecond(ms) {
        Ok(ts) => ts.strftime("%Y%m%dT%H%M%SZ").to_string(),
        Err(_) => String::new(),
    }
}
