use selene::error::SeleneError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        SeleneError::config("x"),
        SeleneError::Config { .. }
    ));
    assert!(matches!(SeleneError::mqtt("x"), SeleneError::Mqtt { .. }));
    assert!(matches!(SeleneError::dbus("x"), SeleneError::DBus { .. }));
    assert!(matches!(SeleneError::parse("x"), SeleneError::Parse { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = SeleneError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, SeleneError::Serialization { .. }));
    assert!(matches!(SeleneError::io("x"), SeleneError::Io { .. }));
    assert!(matches!(
        SeleneError::validation("f", "m"),
        SeleneError::Validation { .. }
    ));
    assert!(matches!(
        SeleneError::timeout("x"),
        SeleneError::Timeout { .. }
    ));
    assert!(matches!(
        SeleneError::generic("x"),
        SeleneError::Generic { .. }
    ));
}

#[test]
fn display_messages() {
    let e = SeleneError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));

    let e = SeleneError::timeout("no message for 60 seconds");
    assert!(format!("{}", e).contains("Timeout error"));
}
