/*
 *  deutils.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use serde::{Deserialize, Deserializer};
use url::{Host, Url};

/// The Web API happily sends `null` for fields it documents as always present
/// (names of local files, image lists of podcasts...). Treat those as the default.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Converts milliseconds into a "M:SS" string, or "H:MM:SS" past the hour.
///
/// # Arguments
/// * `ms` - The duration in milliseconds.
///
/// # Returns
/// A `String` representing the formatted duration.
pub fn ms_to_min_secs(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// True for http(s) URLs pointing at this machine; those skip any proxy.
pub fn is_loopback_url(url: &str) -> bool {
    match Url::parse(url).ok().as_ref().and_then(Url::host) {
        Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_null_default")]
        name: String,
    }

    #[test]
    fn test_ms_to_min_secs() {
        assert_eq!(ms_to_min_secs(0), "0:00");
        assert_eq!(ms_to_min_secs(999), "0:00");
        assert_eq!(ms_to_min_secs(61_000), "1:01");
        assert_eq!(ms_to_min_secs(3_599_000), "59:59");
        assert_eq!(ms_to_min_secs(3_661_000), "1:01:01");
    }

    #[test]
    fn test_loopback_url() {
        assert!(is_loopback_url("http://127.0.0.1:8080/v1"));
        assert!(is_loopback_url("http://localhost:3000/callback"));
        assert!(is_loopback_url("http://[::1]:3000/"));
        assert!(!is_loopback_url("https://api.spotify.com/v1"));
        assert!(!is_loopback_url("not a url"));
    }

    #[test]
    fn test_null_becomes_default() {
        let h: Holder = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(h.name, "");
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(h.name, "");
        let h: Holder = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(h.name, "x");
    }
}
