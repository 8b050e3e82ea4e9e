// ironic-exporter-core/src/provision.rs - Numeric encoding of node provisioning states

/// Fixed lookup table from provisioning state name to gauge value
pub const PROVISION_STATES: &[(&str, u32)] = &[
    ("enroll", 0),
    ("verifying", 1),
    ("manageable", 2),
    ("inspecting", 3),
    ("inspect wait", 4),
    ("inspect failed", 5),
    ("cleaning", 6),
    ("clean wait", 7),
    ("clean failed", 8),
    ("available", 9),
    ("deploying", 10),
    ("wait call-back", 11),
    ("deploy failed", 12),
    ("active", 13),
    ("deleting", 14),
    ("error", 15),
    ("rebuild", 16),
    ("rescuing", 17),
    ("rescue wait", 18),
    ("rescue failed", 19),
    ("rescue", 20),
    ("unrescuing", 21),
    ("unrescue failed", 22),
    ("adopting", 23),
    ("adopt failed", 24),
    ("deploy hold", 25),
    ("clean hold", 26),
    ("servicing", 27),
    ("service wait", 28),
    ("service failed", 29),
    ("service hold", 30),
];

pub struct ProvisionState;

impl ProvisionState {
    /// Returns `None` for states outside the table; callers skip those
    pub fn code(name: &str) -> Option<u32> {
        PROVISION_STATES
            .iter()
            .find(|(state, _)| *state == name)
            .map(|(_, code)| *code)
    }
}
