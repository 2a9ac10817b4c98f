pub const ACTION_CALL: &str = "android.intent.action.CALL";
pub const ACTION_DIAL: &str = "android.intent.action.DIAL";
pub const ACTION_SENDTO: &str = "android.intent.action.SENDTO";
pub const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

/// Normalizes a phone number for a `tel:`/`sms:` URI.
///
/// Keeps digits and the first `+` seen before any digit, so `(+44) 20` keeps
/// its international prefix. A national trunk `0` is dropped from numbers of
/// ten or more characters, and numbers starting with the `90` country code get
/// a `+` prefix. This is tuned for one numbering plan and is not E.164
/// validation.
pub fn sanitize_phone_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut kept = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c.is_ascii_digit() || (c == '+' && kept.is_empty()) {
            kept.push(c);
        }
    }

    if kept.starts_with('0') && kept.len() >= 10 {
        kept.remove(0);
    }
    if kept.starts_with("90") {
        kept.insert(0, '+');
    }
    kept
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub fn am_start_args(action: &str, uri: &str, extras: &[(&str, &str)]) -> Vec<String> {
    let mut args = strings(&["shell", "am", "start", "-a", action, "-d", uri]);
    for (key, value) in extras {
        args.extend(strings(&["--es", key, value]));
    }
    args
}

pub fn call_args(number: &str, immediate: bool) -> Vec<String> {
    let action = if immediate { ACTION_CALL } else { ACTION_DIAL };
    am_start_args(action, &format!("tel:{}", sanitize_phone_number(number)), &[])
}

/// The body rides along as `sms_body` only when non-empty.
pub fn sms_args(number: &str, body: &str) -> Vec<String> {
    let uri = format!("sms:{}", sanitize_phone_number(number));
    if body.is_empty() {
        am_start_args(ACTION_SENDTO, &uri, &[])
    } else {
        am_start_args(ACTION_SENDTO, &uri, &[("sms_body", body)])
    }
}

pub fn launch_args(package: &str) -> Vec<String> {
    strings(&["shell", "monkey", "-p", package, "-c", LAUNCHER_CATEGORY, "1"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_trunk_zero() {
        assert_eq!(sanitize_phone_number("05551234567"), "5551234567");
    }

    #[test]
    fn prefixes_country_code() {
        assert_eq!(sanitize_phone_number("905551234567"), "+905551234567");
        assert_eq!(sanitize_phone_number("+905551234567"), "+905551234567");
    }

    #[test]
    fn strips_formatting() {
        assert_eq!(sanitize_phone_number(" (0555) 123-45 67 "), "5551234567");
        assert_eq!(sanitize_phone_number("+90 555 123 45 67"), "+905551234567");
        assert_eq!(sanitize_phone_number("(+44) 20 7946 0958"), "+442079460958");
        assert_eq!(sanitize_phone_number("tel:+1 555 0100"), "+15550100");
        assert_eq!(sanitize_phone_number("44+20+7946"), "44207946");
        assert_eq!(sanitize_phone_number("112"), "112");
        assert_eq!(sanitize_phone_number(""), "");
    }

    #[test]
    fn short_numbers_keep_leading_zero() {
        assert_eq!(sanitize_phone_number("012345678"), "012345678");
    }

    #[test]
    fn output_is_digits_with_optional_leading_plus() {
        let samples = [
            "05551234567",
            "+90 (555) 123+45+67",
            "abc+def",
            "++++",
            "0090 555",
            "tel:+44 20 7946 0958",
            "٠٥٥٥",
            "\u{FFFD}0\u{FFFD}5",
        ];
        for sample in samples {
            let out = sanitize_phone_number(sample);
            let digits = out.strip_prefix('+').unwrap_or(&out);
            assert!(
                digits.chars().all(|c| c.is_ascii_digit()),
                "{sample:?} produced {out:?}"
            );
        }
    }

    #[test]
    fn builds_call_and_dial_intents() {
        assert_eq!(
            call_args("0555 123 45 67", true),
            vec![
                "shell",
                "am",
                "start",
                "-a",
                "android.intent.action.CALL",
                "-d",
                "tel:5551234567"
            ]
        );
        assert_eq!(call_args("112", false)[4], ACTION_DIAL);
    }

    #[test]
    fn sms_body_is_optional() {
        let without = sms_args("905551234567", "");
        assert_eq!(without.len(), 7);
        assert_eq!(without[6], "sms:+905551234567");

        let with = sms_args("905551234567", "hello there");
        assert_eq!(&with[7..], ["--es", "sms_body", "hello there"]);
    }

    #[test]
    fn builds_monkey_launch() {
        assert_eq!(
            launch_args("com.example").join(" "),
            "shell monkey -p com.example -c android.intent.category.LAUNCHER 1"
        );
    }
}
