pub(crate) use {
    std::{
        collections::HashMap,
        convert::identity,
        fmt,
        io,
        path::{
            Path,
            PathBuf,
        },
        time::Duration,
    },
    async_trait::async_trait,
    chrono::prelude::*,
    chrono_tz::Tz,
    itertools::Itertools,
    serde::{
        Deserialize,
        Serialize,
    },
    tokio::time::{
        Instant,
        sleep_until,
    },
    crate::config::{
        Config,
        State,
    },
};
