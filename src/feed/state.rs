//! Load states of a paginated feed

/// Where a paginated feed is in its load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Nothing requested yet
    #[default]
    Initial,
    /// Local records are being cleared for a fresh load
    Reloading,
    /// A page fetch is in flight
    Loading,
    /// Last page loaded, more are available
    Idle,
    /// Last fetch failed; a retry is scheduled
    Fail,
    /// The server has no further pages
    NoMore,
}

impl LoadState {
    /// Display name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Reloading => "reloading",
            Self::Loading => "loading",
            Self::Idle => "idle",
            Self::Fail => "fail",
            Self::NoMore => "no_more",
        }
    }

    /// Whether `next` may follow this state
    pub const fn can_enter(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initial | Self::Idle | Self::NoMore, Self::Reloading)
                | (Self::Reloading | Self::Idle | Self::Fail, Self::Loading)
                | (Self::Loading, Self::Fail | Self::Idle | Self::NoMore)
        )
    }

    /// Whether a fetch is underway
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Reloading | Self::Loading)
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
