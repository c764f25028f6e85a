#[macro_export]
macro_rules! assert_unique_used_features {
    ($($feature:literal),+ $(,)?) => {
        assert!(
            (0 $(+ cfg!(feature = $feature) as usize)+ ) == 1,
            "Exactly one of the following features must be enabled: {}",
            [$($feature),+].join(", ")
        );
    };
}

fn main() {
    // NOTE: update when adding new HAT pinout support!
    // Ensure that exactly one pinout family has been specified:
    assert_unique_used_features!("hzeller-hat", "adafruit-hat");
}
