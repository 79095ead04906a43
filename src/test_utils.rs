pub mod queries {
    macro_rules! value {
        ($($json:tt)+) => {
            crate::value::Value::from(serde_json::json!($($json)+))
        };
    }

    macro_rules! record {
        ($($json:tt)+) => {
            crate::value::Value::from(serde_json::json!($($json)+))
        };
    }

    macro_rules! matcher {
        ($($json:tt)+) => {
            crate::engine::Engine::new()
                .compile(&crate::value::Value::from(serde_json::json!($($json)+)))
                .unwrap()
        };
    }

    pub(crate) use matcher;
    pub(crate) use record;
    pub(crate) use value;
}
