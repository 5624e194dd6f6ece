use std::collections::HashSet;

use crate::constant::{
    CAPABILITIES_ALWAYS_DISABLED, CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE,
    CAPABILITIES_PROTOCOL_41, CAPABILITIES_PROTOCOL_41_WITH_EOF, CAPABILITIES_PROTOCOL_320,
    CAPABILITY_FEATURES, CapabilityFlags, ColumnType,
};

#[test]
fn capability_tables_partition_all_bits() {
    let always_enabled = CAPABILITIES_ALWAYS_ENABLED;
    let configurable = CAPABILITIES_CONFIGURABLE;
    let always_disabled = CAPABILITIES_ALWAYS_DISABLED;

    assert!(always_enabled.intersection(configurable).is_empty());
    assert!(always_enabled.intersection(always_disabled).is_empty());
    assert!(configurable.intersection(always_disabled).is_empty());

    let union = always_enabled | configurable | always_disabled;
    assert_eq!(
        union.bits(),
        u32::MAX,
        "missing flags: 0x{:08X}",
        !union.bits()
    );

    assert!(always_enabled.contains(CapabilityFlags::CLIENT_PROTOCOL_41));
    assert!(always_enabled.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH));
    assert!(configurable.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF));
    assert!(always_disabled.contains(CapabilityFlags::CLIENT_SSL));
}

#[test]
fn protocol_41_extends_protocol_320() {
    assert!(CAPABILITIES_PROTOCOL_41.contains(CAPABILITIES_PROTOCOL_320));
    assert!(!CAPABILITIES_PROTOCOL_320.is_protocol_41());
    assert!(CAPABILITIES_PROTOCOL_41.is_protocol_41());
    assert!(CAPABILITIES_PROTOCOL_41.is_deprecate_eof());

    assert!(CAPABILITIES_PROTOCOL_41_WITH_EOF.contains(CAPABILITIES_PROTOCOL_320));
    assert!(CAPABILITIES_PROTOCOL_41_WITH_EOF.is_protocol_41());
    assert!(!CAPABILITIES_PROTOCOL_41_WITH_EOF.is_deprecate_eof());
    let mut with_eof = CAPABILITIES_PROTOCOL_41_WITH_EOF;
    with_eof.set_deprecate_eof();
    assert_eq!(with_eof, CAPABILITIES_PROTOCOL_41);
}

#[test]
fn every_bit_has_one_feature() {
    assert_eq!(CAPABILITY_FEATURES.len(), 32);
    let names: HashSet<_> = CAPABILITY_FEATURES.iter().map(|(name, _, _)| *name).collect();
    assert_eq!(names.len(), 32);
}

#[test]
fn setters_are_isolated() {
    for (name, is, set) in CAPABILITY_FEATURES {
        let mut flags = CapabilityFlags::empty();
        set(&mut flags);
        assert!(is(&flags), "{} not set", name);
        assert_eq!(flags.bits().count_ones(), 1, "{} set more than one bit", name);

        for (other, other_is, _) in CAPABILITY_FEATURES {
            if other != name {
                assert!(!other_is(&flags), "setting {} flipped {}", name, other);
            }
        }
    }
}

#[test]
fn setters_only_add_bits() {
    let mut flags = CAPABILITIES_PROTOCOL_41;
    for (_, is, set) in CAPABILITY_FEATURES {
        let before = flags;
        let was_set = is(&flags);
        set(&mut flags);
        assert!(flags.contains(before));
        if was_set {
            assert_eq!(flags, before);
        }
    }
    assert_eq!(flags.bits(), u32::MAX);
}

#[test]
fn halves_reconstruct_value() {
    let mut value: u32 = 0x9E37_79B9;
    for _ in 0..1000 {
        let flags = CapabilityFlags::from_bits(value);
        let rebuilt = (u32::from(flags.upper_2_bytes()) << 16) | u32::from(flags.lower_2_bytes());
        assert_eq!(rebuilt, value);
        assert_eq!(
            CapabilityFlags::from_halves(flags.lower_2_bytes(), flags.upper_2_bytes()),
            flags
        );
        value = value.rotate_left(7).wrapping_mul(0x0100_0193) ^ 0x5bd1_e995;
    }

    for value in [0, 1, 0xFFFF, 0x1_0000, u32::MAX] {
        let flags = CapabilityFlags::from_bits(value);
        assert_eq!(
            CapabilityFlags::from_halves(flags.lower_2_bytes(), flags.upper_2_bytes()).bits(),
            value
        );
    }
}

#[test]
fn equality_and_hash_follow_value() {
    let mut built = CapabilityFlags::empty();
    built.set_protocol_41();
    built.set_deprecate_eof();
    let direct = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_DEPRECATE_EOF;
    assert_eq!(built, direct);

    let set: HashSet<_> = [built, direct, CapabilityFlags::from_bits(direct.bits())]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 1);
    assert_eq!(format!("{}", built), "0x01000200");
}

#[test]
fn column_type_lookup() {
    assert_eq!(ColumnType::from_u8(0x03), Some(ColumnType::MYSQL_TYPE_LONG));
    assert_eq!(ColumnType::from_u8(0xfc), Some(ColumnType::MYSQL_TYPE_BLOB));
    assert_eq!(ColumnType::from_u8(0x50), None);
    assert!(ColumnType::MYSQL_TYPE_YEAR.is_integer());
    assert!(!ColumnType::MYSQL_TYPE_DOUBLE.is_integer());
}
