//! Lua unlock script generation.
//!
//! Output is a pure function of its inputs: depots are visited in
//! [`DepotId`] order (numeric first) and each depot's manifests in
//! [`ManifestId`](crate::depot::ManifestId) order.
//!
//! Depot identifiers are written as bare Lua numbers, so only purely
//! numeric ones are scripted. The rest are reported by
//! [`unscriptable_depots`] and left out.

use std::collections::BTreeSet;

use crate::depot::{DepotId, KeySet, ManifestSet};

/// File name of the script inside the archive.
pub fn script_file_name(app_id: &str) -> String {
    format!("{}.lua", app_id)
}

fn depots<'a>(keys: &'a KeySet, manifests: &'a ManifestSet) -> BTreeSet<&'a DepotId> {
    keys.keys().chain(manifests.iter().map(|m| &m.depot)).collect()
}

/// Depots that cannot appear in the script because their identifier is not numeric.
pub fn unscriptable_depots(keys: &KeySet, manifests: &ManifestSet) -> Vec<DepotId> {
    depots(keys, manifests)
        .into_iter()
        .filter(|depot| !depot.is_numeric())
        .cloned()
        .collect()
}

/// Render the unlock script for `app_id`.
///
/// An empty key set yields a script with manifest entries only.
pub fn generate(app_id: &str, keys: &KeySet, manifests: &ManifestSet) -> String {
    let mut lines = vec![format!("addappid({})", app_id)];

    for depot in depots(keys, manifests).into_iter().filter(|d| d.is_numeric()) {
        if let Some(key) = keys.get(depot) {
            lines.push(format!("addappid({},1,{})", depot, lua_string(key)));
        }

        let mut last = None;
        for manifest in manifests.iter().filter(|m| &m.depot == depot) {
            // the same manifest may exist at several paths
            if last == Some(&manifest.manifest) {
                continue;
            }
            last = Some(&manifest.manifest);
            lines.push(format!(
                "setManifestid({},{},0)",
                depot,
                lua_string(manifest.manifest.as_str())
            ));
        }
    }

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

fn lua_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depot::ManifestRef;

    fn manifests(paths: &[&str]) -> ManifestSet {
        paths.iter().filter_map(|p| ManifestRef::from_path(p)).collect()
    }

    fn keys(pairs: &[(&str, &str)]) -> KeySet {
        pairs.iter().map(|(d, k)| (DepotId::from(*d), k.to_string())).collect()
    }

    #[test]
    fn test_keys_and_manifests() {
        let script = generate(
            "42",
            &keys(&[("101", "def"), ("100", "abc")]),
            &manifests(&["101_5.manifest", "100_1.manifest"]),
        );
        assert_eq!(
            script,
            "addappid(42)\n\
             addappid(100,1,\"abc\")\n\
             setManifestid(100,\"1\",0)\n\
             addappid(101,1,\"def\")\n\
             setManifestid(101,\"5\",0)\n"
        );
    }

    #[test]
    fn test_manifests_only() {
        let script = generate("7", &KeySet::new(), &manifests(&["9_2.manifest", "9_10.manifest"]));
        assert_eq!(
            script,
            "addappid(7)\nsetManifestid(9,\"2\",0)\nsetManifestid(9,\"10\",0)\n"
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(generate("7", &KeySet::new(), &ManifestSet::new()), "addappid(7)\n");
    }

    #[test]
    fn test_deterministic_regardless_of_insertion_order() {
        let a = generate(
            "1",
            &keys(&[("3", "c"), ("1", "a"), ("2", "b")]),
            &manifests(&["3_1.manifest", "x_1.manifest", "1_1.manifest"]),
        );
        let b = generate(
            "1",
            &keys(&[("2", "b"), ("3", "c"), ("1", "a")]),
            &manifests(&["1_1.manifest", "3_1.manifest", "x_1.manifest"]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_numeric_depots_are_left_out() {
        let keys = keys(&[("abc", "k"), ("9);evil()--", "k"), ("+5", "k"), ("7", "ok")]);
        let manifests = manifests(&["200_1.manifest", "1);os.execute(\"calc\")--_2.manifest"]);

        let script = generate("1", &keys, &manifests);
        assert_eq!(
            script,
            "addappid(1)\n\
             addappid(7,1,\"ok\")\n\
             setManifestid(200,\"1\",0)\n"
        );
        assert!(!script.contains("evil"));
        assert!(!script.contains("os.execute"));

        let skipped: Vec<String> = unscriptable_depots(&keys, &manifests)
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(skipped, vec!["+5", "1);os.execute(\"calc\")--", "9);evil()--", "abc"]);
    }

    #[test]
    fn test_duplicate_manifest_paths_emit_once() {
        let script = generate("1", &KeySet::new(), &manifests(&["a/5_1.manifest", "b/5_1.manifest"]));
        assert_eq!(script.matches("setManifestid").count(), 1);
    }

    #[test]
    fn test_quotes_are_escaped() {
        let script = generate("1", &keys(&[("5", "a\"b")]), &ManifestSet::new());
        assert!(script.contains(r#"addappid(5,1,"a\"b")"#));
    }

    #[test]
    fn test_control_characters_are_escaped() {
        let script = generate("1", &keys(&[("5", "a\0b\tc\u{7f}\nd")]), &ManifestSet::new());
        assert!(script.contains(r#"addappid(5,1,"a\000b\009c\127\nd")"#));
        assert_eq!(script.lines().count(), 2);
    }

    #[test]
    fn test_script_file_name() {
        assert_eq!(script_file_name("1245620"), "1245620.lua");
    }
}
