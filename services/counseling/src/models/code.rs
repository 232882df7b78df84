//! Common codes and status display records

use serde::{Deserialize, Serialize};

use super::extension::ExtensionStatus;
use super::mapping::MappingStatus;

/// Label, color and icon shown for a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

// Indexed by the enum discriminant; `ALL` on each enum lists the same order.
static MAPPING_STATUS_DISPLAY: [StatusDisplay; 7] = [
    StatusDisplay {
        label: "Active",
        color: "#28a745",
        icon: "✅",
    },
    StatusDisplay {
        label: "Inactive",
        color: "#6c757d",
        icon: "⚪",
    },
    StatusDisplay {
        label: "Suspended",
        color: "#fd7e14",
        icon: "⏸️",
    },
    StatusDisplay {
        label: "Terminated",
        color: "#dc3545",
        icon: "❌",
    },
    StatusDisplay {
        label: "Sessions exhausted",
        color: "#6f42c1",
        icon: "🔚",
    },
    StatusDisplay {
        label: "Awaiting payment",
        color: "#ffc107",
        icon: "⏳",
    },
    StatusDisplay {
        label: "Payment confirmed",
        color: "#17a2b8",
        icon: "💰",
    },
];

static EXTENSION_STATUS_DISPLAY: [StatusDisplay; 5] = [
    StatusDisplay {
        label: "Awaiting payment",
        color: "#ffc107",
        icon: "⏳",
    },
    StatusDisplay {
        label: "Payment confirmed",
        color: "#17a2b8",
        icon: "💰",
    },
    StatusDisplay {
        label: "Approved",
        color: "#007bff",
        icon: "👍",
    },
    StatusDisplay {
        label: "Completed",
        color: "#28a745",
        icon: "✅",
    },
    StatusDisplay {
        label: "Rejected",
        color: "#dc3545",
        icon: "🚫",
    },
];

/// Status enum with a display record and a code group
pub trait DisplayCode: Copy + Sized + 'static {
    /// Name of the code group served by `/common-codes/{group}`
    const GROUP: &'static str;

    fn all() -> &'static [Self];
    fn value(&self) -> &'static str;
    fn display(&self) -> &'static StatusDisplay;

    /// The whole group as common codes, in table order
    fn common_codes() -> Vec<CommonCode> {
        Self::all()
            .iter()
            .enumerate()
            .map(|(index, status)| {
                let display = status.display();
                CommonCode {
                    code_group: Self::GROUP.to_string(),
                    code_value: status.value().to_string(),
                    code_label: display.label.to_string(),
                    color_code: Some(display.color.to_string()),
                    icon: Some(display.icon.to_string()),
                    sort_order: index as i32 + 1,
                }
            })
            .collect()
    }
}

impl DisplayCode for MappingStatus {
    const GROUP: &'static str = "MAPPING_STATUS";

    fn all() -> &'static [Self] {
        &MappingStatus::ALL
    }

    fn value(&self) -> &'static str {
        self.as_str()
    }

    fn display(&self) -> &'static StatusDisplay {
        &MAPPING_STATUS_DISPLAY[*self as usize]
    }
}

impl DisplayCode for ExtensionStatus {
    const GROUP: &'static str = "EXTENSION_STATUS";

    fn all() -> &'static [Self] {
        &ExtensionStatus::ALL
    }

    fn value(&self) -> &'static str {
        self.as_str()
    }

    fn display(&self) -> &'static StatusDisplay {
        &EXTENSION_STATUS_DISPLAY[*self as usize]
    }
}

/// Built-in codes for a group backed by a status enum
pub fn builtin_codes(group: &str) -> Option<Vec<CommonCode>> {
    if group == MappingStatus::GROUP {
        Some(MappingStatus::common_codes())
    } else if group == ExtensionStatus::GROUP {
        Some(ExtensionStatus::common_codes())
    } else {
        None
    }
}

/// One entry of a code group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonCode {
    pub code_group: String,
    pub code_value: String,
    pub code_label: String,
    pub color_code: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tables_follow_enum_order() {
        for (index, status) in MappingStatus::ALL.iter().enumerate() {
            assert_eq!(*status as usize, index, "{} out of order", status);
        }
        for (index, status) in ExtensionStatus::ALL.iter().enumerate() {
            assert_eq!(*status as usize, index, "{} out of order", status);
        }
    }

    #[test]
    fn test_status_display_lookup() {
        assert_eq!(MappingStatus::SessionsExhausted.display().icon, "🔚");
        assert_eq!(ExtensionStatus::Rejected.display().color, "#dc3545");
        assert_eq!(ExtensionStatus::Completed.display().label, "Completed");
    }

    #[test]
    fn test_builtin_codes() {
        let codes = builtin_codes("EXTENSION_STATUS").unwrap();
        assert_eq!(codes.len(), 5);
        assert_eq!(codes[0].code_value, "PENDING");
        assert_eq!(codes[0].sort_order, 1);
        assert_eq!(codes[4].code_value, "REJECTED");

        assert_eq!(builtin_codes("MAPPING_STATUS").unwrap().len(), 7);
        assert!(builtin_codes("PAYMENT_METHOD").is_none());
    }
}
