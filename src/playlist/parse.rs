use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;

use super::{sort_by_start, Automation, PlaylistItem};

lazy_static! {
    static ref HMS_RE: Regex = Regex::new(r"^([0-9]{1,3}):([0-9]{2}):([0-9]{2})$").unwrap();
    static ref ELEMENT_SEL: Selector = Selector::parse("div.element").unwrap();
    static ref TIME_SEL: Selector =
        Selector::parse(r#"span.editor-time, span[class*="editor-time"]"#).unwrap();
    static ref TITLE_SEL: Selector =
        Selector::parse(r#"span.editor-title, span[class*="editor-title"]"#).unwrap();
    static ref ELLIPSIS_SEL: Selector = Selector::parse("span.ellipsis").unwrap();
    static ref SPAN_SEL: Selector = Selector::parse("span").unwrap();
    static ref INPUT_SEL: Selector = Selector::parse("input").unwrap();
    static ref CPL_NAME_SEL: Selector =
        Selector::parse(r#"input[name="cplname"], input[name="cpl_name"]"#).unwrap();
    static ref DURATION_SEL: Selector = Selector::parse(r#"input[name="duration"]"#).unwrap();
    static ref CPL_ID_SEL: Selector = Selector::parse(r#"input[name="cpl"]"#).unwrap();
    static ref ADD_ON_SEL: Selector = Selector::parse("div.addOnDiv").unwrap();
    static ref AUTOMATION_SEL: Selector = Selector::parse("div.element.automation").unwrap();
}

/// Classes that mark a row as a real show element even without time or CPL data.
const ITEM_CLASSES: [&str; 9] = [
    "feature",
    "short",
    "trailer",
    "teaser",
    "psa",
    "advertisement",
    "policy",
    "pattern",
    "pack",
];

/// Parse a show-relative time into seconds.
///
/// Accepts `H:MM:SS` (up to three hour digits), a bare `HHMMSS` run of six
/// digits, or any other digit run as plain seconds. Non-digits are ignored
/// outside the `H:MM:SS` form.
pub fn parse_sec(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if let Some(cap) = HMS_RE.captures(s) {
        let h: u64 = cap[1].parse().ok()?;
        let m: u64 = cap[2].parse().ok()?;
        let sec: u64 = cap[3].parse().ok()?;
        return Some(h * 3600 + m * 60 + sec);
    }
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 6 {
        let h: u64 = digits[0..2].parse().ok()?;
        let m: u64 = digits[2..4].parse().ok()?;
        let sec: u64 = digits[4..6].parse().ok()?;
        return Some(h * 3600 + m * 60 + sec);
    }
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Same as [`parse_sec`] for JSON values; numbers are rounded.
pub fn parse_sec_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64),
        Value::String(s) => parse_sec(s),
        _ => None,
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Title attribute if present, else text, of the first match.
fn best_text(el: ElementRef<'_>, selector: &Selector) -> String {
    match el.select(selector).next() {
        Some(x) => match x.value().attr("title").filter(|t| !t.is_empty()) {
            Some(title) => title.trim().to_string(),
            None => text_of(x),
        },
        None => String::new(),
    }
}

fn input_value(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|v| v.trim().to_string())
}

fn input_value_by_id(container: ElementRef<'_>, id: &str) -> String {
    container
        .select(&INPUT_SEL)
        .find(|input| input.value().attr("id") == Some(id))
        .and_then(|input| input.value().attr("value"))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn parse_item_row(row: ElementRef<'_>) -> Option<PlaylistItem> {
    let classes: Vec<String> = row
        .value()
        .attr("class")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let lower: Vec<String> = classes.iter().map(|c| c.to_lowercase()).collect();
    if lower.iter().any(|c| c == "automation") {
        return None;
    }

    let has_time = row.select(&TIME_SEL).next().is_some();
    let has_title = row.select(&TITLE_SEL).next().is_some();
    let mut time_text = best_text(row, &TIME_SEL);
    let mut title = best_text(row, &TITLE_SEL);

    // renders without editor-time/editor-title fall back to plain ellipsis spans
    if !has_time || !has_title {
        let spans: Vec<ElementRef<'_>> = row.select(&ELLIPSIS_SEL).collect();
        if !has_time && time_text.is_empty() {
            if let Some(first) = spans.first() {
                time_text = text_of(*first);
            }
        }
        if !has_title && title.is_empty() {
            if let Some(second) = spans.get(1) {
                title = match second.value().attr("title").filter(|t| !t.is_empty()) {
                    Some(t) => t.to_string(),
                    None => text_of(*second),
                };
            }
        }
    }

    if time_text.is_empty() && title.is_empty() && !has_time && !has_title {
        return None;
    }

    let start_seconds = parse_sec(&time_text);
    let cpl_name = input_value(row, &CPL_NAME_SEL).unwrap_or_default();
    let cpl_id = input_value(row, &CPL_ID_SEL).unwrap_or_default();
    let duration = input_value(row, &DURATION_SEL)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|d| d.is_finite());

    let looks_like_item = start_seconds.is_some()
        || duration.is_some()
        || !cpl_name.is_empty()
        || !cpl_id.is_empty()
        || lower.iter().any(|c| ITEM_CLASSES.contains(&c.as_str()));
    if !looks_like_item {
        return None;
    }

    Some(PlaylistItem {
        id: row.value().attr("id").unwrap_or_default().trim().to_string(),
        classes,
        time_text,
        start_seconds,
        title,
        cpl_name,
        cpl_id,
        duration,
        automations: Vec::new(),
    })
}

fn parse_automations(add_on: ElementRef<'_>, into: &mut Vec<Automation>) {
    for row in add_on.select(&AUTOMATION_SEL) {
        let id = row.value().attr("id").unwrap_or_default().trim().to_string();

        let mut time_text = best_text(row, &TIME_SEL);
        let mut title = best_text(row, &TITLE_SEL);
        if time_text.is_empty() || title.is_empty() {
            let spans: Vec<ElementRef<'_>> = row.select(&SPAN_SEL).collect();
            if time_text.is_empty() {
                if let Some(first) = spans.first() {
                    time_text = text_of(*first);
                }
            }
            if title.is_empty() {
                if let Some(second) = spans.get(1) {
                    title = text_of(*second);
                }
            }
        }
        if title.is_empty() {
            continue;
        }
        if !id.is_empty() && into.iter().any(|a| a.id == id) {
            continue;
        }

        let (kind, frame_offset) = if id.is_empty() {
            (String::new(), None)
        } else {
            let offset = input_value_by_id(add_on, &format!("offset{}", id));
            (
                input_value_by_id(add_on, &format!("kind{}", id)),
                offset.parse::<f64>().ok().filter(|f| f.is_finite()),
            )
        };

        into.push(Automation {
            start_seconds: parse_sec(&time_text),
            id,
            time_text,
            title,
            kind,
            frame_offset,
        });
    }
}

/// Turn a playlist-editor fragment into a sorted timeline.
///
/// Automation containers (`div.addOnDiv`) are matched to their item by the
/// item's element id first, then by its CPL id.
pub fn parse_playlist(html: &str) -> Vec<PlaylistItem> {
    let document = Html::parse_document(html);

    let mut items: Vec<PlaylistItem> = document
        .select(&ELEMENT_SEL)
        .filter_map(parse_item_row)
        .collect();

    let mut add_ons: HashMap<&str, ElementRef<'_>> = HashMap::new();
    for add_on in document.select(&ADD_ON_SEL) {
        if let Some(name) = add_on.value().attr("name").map(str::trim) {
            if !name.is_empty() {
                add_ons.insert(name, add_on);
            }
        }
    }

    for item in &mut items {
        let mut automations = Vec::new();
        let by_element_id = Some(item.id.as_str()).filter(|k| !k.is_empty());
        let by_cpl_id = Some(item.cpl_id.as_str()).filter(|k| !k.is_empty());
        for key in [by_element_id, by_cpl_id].into_iter().flatten() {
            if let Some(add_on) = add_ons.get(key) {
                parse_automations(*add_on, &mut automations);
            }
        }
        sort_by_start(&mut automations, |a| a.start_seconds);
        item.automations = automations;
    }

    sort_by_start(&mut items, |it| it.start_seconds);
    items
}
