//! Weekday names as staff write them: "Mon", "Tues", "R", "Thu/Fri", "M, W".

use chrono::Weekday;

pub fn parse_weekday(token: &str) -> Option<Weekday> {
    let t = token.trim().trim_end_matches('.').to_lowercase();
    if t.is_empty() {
        return None;
    }
    // order matters: "th" before "t", "sa"/"su" before anything starting with "s"
    let day = if t.starts_with("su") {
        Weekday::Sun
    } else if t.starts_with("sa") {
        Weekday::Sat
    } else if t.starts_with("th") || t.starts_with('r') {
        Weekday::Thu
    } else if t.starts_with('t') {
        Weekday::Tue
    } else if t.starts_with('m') {
        Weekday::Mon
    } else if t.starts_with('w') {
        Weekday::Wed
    } else if t.starts_with('f') {
        Weekday::Fri
    } else {
        return None;
    };
    Some(day)
}

/// Split on `,` or `/`, drop anything unrecognised, sort Monday first, dedupe.
pub fn parse_weekdays(text: &str) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = text.split([',', '/']).filter_map(parse_weekday).collect();
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    days
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// RFC 5545 BYDAY code.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

pub fn weekday_from_code(code: &str) -> Option<Weekday> {
    let day = match code.trim().to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// "Monday,Wednesday"
pub fn days_label(days: &[Weekday]) -> String {
    days.iter()
        .map(|d| weekday_name(*d))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("m"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("Tues."), Some(Weekday::Tue));
        assert_eq!(parse_weekday("T"), Some(Weekday::Tue));
        assert_eq!(parse_weekday("Thursday"), Some(Weekday::Thu));
        assert_eq!(parse_weekday("R"), Some(Weekday::Thu));
        assert_eq!(parse_weekday("wed"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("F"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("Sat"), Some(Weekday::Sat));
        assert_eq!(parse_weekday("sun"), Some(Weekday::Sun));
        assert_eq!(parse_weekday("S"), None);
        assert_eq!(parse_weekday("online"), None);
    }

    #[test]
    fn test_multi_day_fields() {
        assert_eq!(
            parse_weekdays("Wed, Mon/ Fri,Mon"),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert_eq!(parse_weekdays("T/R"), vec![Weekday::Tue, Weekday::Thu]);
        assert!(parse_weekdays("online").is_empty());
        assert!(parse_weekdays("").is_empty());
    }

    #[test]
    fn test_labels_and_codes() {
        assert_eq!(days_label(&[Weekday::Mon, Weekday::Wed]), "Monday,Wednesday");
        assert_eq!(weekday_code(Weekday::Thu), "TH");
        assert_eq!(weekday_from_code("th"), Some(Weekday::Thu));
        assert_eq!(weekday_from_code("XX"), None);
    }
}
