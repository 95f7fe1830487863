use std::collections::HashMap;

/// `wpa_cli status` 输出中我们关心的字段
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(super) struct WpaStatus {
    pub wpa_state: String,
    pub ip_address: Option<String>,
    pub reason: Option<String>,
}

/// 解析 `key=value` 形式的 status 输出，未知字段忽略
pub(super) fn parse_status(output: &str) -> WpaStatus {
    let fields: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .collect();
    WpaStatus {
        wpa_state: fields.get("wpa_state").copied().unwrap_or("UNKNOWN").to_string(),
        ip_address: fields.get("ip_address").map(|s| s.to_string()),
        reason: fields.get("reason").map(|s| s.to_string()),
    }
}

/// One poll of the association state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Progress {
    Completed,
    WrongKey,
    Pending,
    Failed,
}

/// `in_grace` covers the first seconds after `select_network`, during which
/// wpa_supplicant still reports the previous DISCONNECTED state.
pub(super) fn classify(status: &WpaStatus, in_grace: bool) -> Progress {
    if status.reason.as_deref() == Some("WRONG_KEY") {
        return Progress::WrongKey;
    }
    match status.wpa_state.as_str() {
        "COMPLETED" => Progress::Completed,
        "SCANNING" | "AUTHENTICATING" | "ASSOCIATING" | "ASSOCIATED" | "4WAY_HANDSHAKE"
        | "GROUP_HANDSHAKE" => Progress::Pending,
        "DISCONNECTED" | "INACTIVE" | "INTERFACE_DISABLED" if !in_grace => Progress::Failed,
        _ => Progress::Pending,
    }
}

/// wpa_cli 要求字符串参数带引号，wpa_supplicant 取到最后一个引号为止
pub(super) fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

/// SSID 以不带引号的十六进制传入，任意字节都不会破坏命令
pub(super) fn ssid_hex(ssid: &str) -> String {
    ssid.bytes().map(|b| format!("{b:02x}")).collect()
}

/// `add_network` prints the new id on its last line.
pub(super) fn parse_network_id(output: &str) -> Option<u32> {
    output.lines().last()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETED: &str = "bssid=aa:bb:cc:dd:ee:ff\n\
        freq=2437\n\
        ssid=HomeNet\n\
        id=0\n\
        mode=station\n\
        key_mgmt=WPA2-PSK\n\
        wpa_state=COMPLETED\n\
        ip_address=192.168.1.23\n\
        address=11:22:33:44:55:66\n";

    #[test]
    fn parses_completed_status() {
        let status = parse_status(COMPLETED);
        assert_eq!(status.wpa_state, "COMPLETED");
        assert_eq!(status.ip_address.as_deref(), Some("192.168.1.23"));
        assert_eq!(classify(&status, true), Progress::Completed);
    }

    #[test]
    fn wrong_key_wins_over_state() {
        let status = parse_status("wpa_state=DISCONNECTED\nreason=WRONG_KEY\n");
        assert_eq!(classify(&status, true), Progress::WrongKey);
    }

    #[test]
    fn disconnected_is_pending_during_grace() {
        let status = parse_status("wpa_state=DISCONNECTED\n");
        assert_eq!(classify(&status, true), Progress::Pending);
        assert_eq!(classify(&status, false), Progress::Failed);
    }

    #[test]
    fn handshake_states_are_pending() {
        for state in ["SCANNING", "ASSOCIATING", "4WAY_HANDSHAKE"] {
            let status = parse_status(&format!("wpa_state={state}"));
            assert_eq!(classify(&status, false), Progress::Pending, "{state}");
        }
    }

    #[test]
    fn missing_state_is_unknown() {
        let status = parse_status("Selected interface 'wlan0'\n");
        assert_eq!(status.wpa_state, "UNKNOWN");
        assert_eq!(classify(&status, false), Progress::Pending);
    }

    #[test]
    fn ssid_with_quotes_and_backslash_is_hex_encoded() {
        assert_eq!(ssid_hex("a\"b\\"), "6122625c");
        assert_eq!(ssid_hex("咖啡"), "e59296e595a1");
        assert!(
            ssid_hex("Home \"Net\"")
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        );
    }

    #[test]
    fn network_id_from_last_line() {
        assert_eq!(parse_network_id("Selected interface 'wlan0'\n3\n"), Some(3));
        assert_eq!(parse_network_id("0"), Some(0));
        assert_eq!(parse_network_id("FAIL"), None);
    }
}
