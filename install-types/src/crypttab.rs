// SPDX-License-Identifier: GPL-3.0-only

/// Single crypttab line unlocking the root container at boot.
pub fn crypttab_line(volume_name: &str, container_uuid: &str) -> String {
    format!("{volume_name} UUID={container_uuid} none luks\n")
}
