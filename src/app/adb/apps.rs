use crate::app::models::{AppInfo, PackageRecord};

const PACKAGE_PREFIX: &str = "package:";
const INSTALL_PERMISSIONS_MARKER: &str = "install permissions:";

/// Checked in order; the first substring found in the lowercased package id wins.
pub const FRIENDLY_NAMES: &[(&str, &str)] = &[
    ("whatsapp", "WhatsApp"),
    ("instagram", "Instagram"),
    ("facebook", "Facebook"),
    ("chrome", "Chrome"),
    ("youtube", "YouTube"),
    ("gmail", "Gmail"),
    ("maps", "Google Maps"),
    ("spotify", "Spotify"),
    ("netflix", "Netflix"),
    ("telegram", "Telegram"),
];

pub fn friendly_name(package_id: &str) -> Option<&'static str> {
    let lowered = package_id.to_lowercase();
    FRIENDLY_NAMES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, name)| *name)
}

/// Parses `pm list packages` into records sorted by display name
/// (case-insensitive).
pub fn parse_pm_list_packages_output(output: &str) -> Vec<PackageRecord> {
    let mut packages: Vec<PackageRecord> = output
        .lines()
        .filter_map(|line| line.strip_prefix(PACKAGE_PREFIX))
        .map(str::trim)
        .filter(|package_id| !package_id.is_empty())
        .map(|package_id| PackageRecord {
            package_id: package_id.to_string(),
            display_name: friendly_name(package_id)
                .map(str::to_string)
                .unwrap_or_else(|| package_id.to_string()),
        })
        .collect();
    packages.sort_by_key(|record| record.display_name.to_lowercase());
    packages
}

/// Case-insensitive match on either the package id or the display name.
pub fn filter_packages<'a>(packages: &'a [PackageRecord], query: &str) -> Vec<&'a PackageRecord> {
    let query = query.trim().to_lowercase();
    packages
        .iter()
        .filter(|record| {
            query.is_empty()
                || record.package_id.to_lowercase().contains(&query)
                || record.display_name.to_lowercase().contains(&query)
        })
        .collect()
}

fn token_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let (_, tail) = line.split_once(marker)?;
    tail.split_whitespace().next()
}

/// Extracts `versionName=` and `targetSdk=` from `dumpsys package <pkg>`.
/// Scanning stops at the install permissions section, which can be very long.
pub fn parse_app_info(package: &str, output: &str) -> AppInfo {
    let mut info = AppInfo {
        package: package.to_string(),
        version: None,
        target_sdk: None,
    };
    for raw in output.lines() {
        let line = raw.trim();
        if line.to_lowercase().contains(INSTALL_PERMISSIONS_MARKER) {
            break;
        }
        if line.contains("versionName=") {
            if let Some(token) = token_after(line, "versionName=") {
                info.version = Some(token.to_string());
            }
        } else if line.contains("targetSdk=") {
            if let Some(token) = token_after(line, "targetSdk=") {
                info.target_sdk = Some(token.to_string());
            }
        }
    }
    info
}

/// First APK path reported by `pm path <pkg>`.
pub fn parse_pm_path_output(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(PACKAGE_PREFIX))
        .map(str::trim)
        .find(|path| !path.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_packages_to_friendly_names() {
        let packages = parse_pm_list_packages_output("package:com.whatsapp.w4b\n");
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package_id, "com.whatsapp.w4b");
        assert_eq!(packages[0].display_name, "WhatsApp");
    }

    #[test]
    fn unknown_package_keeps_its_id() {
        let packages = parse_pm_list_packages_output("package:org.example.notes\n");
        assert_eq!(packages[0].display_name, "org.example.notes");
    }

    #[test]
    fn friendly_names_match_case_insensitively_in_table_order() {
        assert_eq!(friendly_name("com.Spotify.Music"), Some("Spotify"));
        // "facebook" precedes "maps" in the table.
        assert_eq!(friendly_name("com.facebook.maps"), Some("Facebook"));
        assert_eq!(friendly_name("com.google.android.apps.maps"), Some("Google Maps"));
        assert_eq!(friendly_name("com.example"), None);
    }

    #[test]
    fn sorts_by_display_name_case_insensitively() {
        let output = "package:org.zeta\npackage:com.whatsapp\npackage:org.alpha\npackage:Org.Beta\npackage:com.android.chrome\n";
        let names: Vec<String> = parse_pm_list_packages_output(output)
            .into_iter()
            .map(|record| record.display_name)
            .collect();
        assert_eq!(
            names,
            vec!["Chrome", "org.alpha", "Org.Beta", "org.zeta", "WhatsApp"]
        );
    }

    #[test]
    fn ignores_lines_without_prefix() {
        let output = "Error: something\n\npackage:com.example\n  package:indented\n";
        let packages = parse_pm_list_packages_output(output);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package_id, "com.example");
    }

    #[test]
    fn parsing_is_deterministic() {
        let output = "package:com.b\npackage:com.a\npackage:com.telegram\n";
        assert_eq!(
            parse_pm_list_packages_output(output),
            parse_pm_list_packages_output(output)
        );
    }

    #[test]
    fn filters_by_id_or_name() {
        let packages = parse_pm_list_packages_output("package:com.whatsapp\npackage:org.example\n");
        let hits = filter_packages(&packages, "whats");
        assert_eq!(hits.len(), 1);
        assert_eq!(filter_packages(&packages, "EXAMPLE").len(), 1);
        assert_eq!(filter_packages(&packages, "  ").len(), 2);
    }

    #[test]
    fn parses_app_info_tokens() {
        let output = "Packages:\n  Package [com.example] (abc):\n    versionCode=12 minSdk=24 targetSdk=34\n    versionName=1.2.3 extra\n";
        let info = parse_app_info("com.example", output);
        assert_eq!(info.package, "com.example");
        assert_eq!(info.version.as_deref(), Some("1.2.3"));
        assert_eq!(info.target_sdk.as_deref(), Some("34"));
    }

    #[test]
    fn app_info_stops_at_install_permissions() {
        let output = "    versionName=2.0\n    Install Permissions:\n    targetSdk=33\n";
        let info = parse_app_info("com.example", output);
        assert_eq!(info.version.as_deref(), Some("2.0"));
        assert_eq!(info.target_sdk, None);
    }

    #[test]
    fn parses_pm_path() {
        assert_eq!(
            parse_pm_path_output("package:/data/app/com.example-1/base.apk\n").as_deref(),
            Some("/data/app/com.example-1/base.apk")
        );
        assert_eq!(parse_pm_path_output(""), None);
    }
}
