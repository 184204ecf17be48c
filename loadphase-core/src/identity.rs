use crate::{Error, Result};

/// Identities a single worker can issue before colliding with the next index.
pub const DEFAULT_IDENTITY_SPACE: u64 = 100_000;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum IdentityMode {
    /// Every request carries a fresh identity.
    #[default]
    Unique,
    /// A worker repeats one identity for its whole life to exercise duplicate handling.
    Repeat,
}

/// `index * space + iteration`, or `None` if that leaves `u64`.
#[must_use]
pub fn request_identity(index: u64, iteration: u64, space: u64) -> Option<u64> {
    index.checked_mul(space)?.checked_add(iteration)
}

/// Per-worker state; only the owning worker advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    index: u64,
    iterations: u64,
}

impl WorkerIdentity {
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self {
            index,
            iterations: 0,
        }
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn advance(&mut self) {
        self.iterations = self.iterations.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityGenerator {
    mode: IdentityMode,
    space: u64,
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self {
            mode: IdentityMode::Unique,
            space: DEFAULT_IDENTITY_SPACE,
        }
    }
}

impl IdentityGenerator {
    /// `max_index` is the largest worker index the run is expected to hand out.
    pub fn new(mode: IdentityMode, space: u64, max_index: u64) -> Result<Self> {
        let fits = space > 0
            && request_identity(max_index.saturating_add(1), 0, space).is_some();
        if !fits {
            return Err(Error::InvalidIdentitySpace { space, max_index });
        }
        Ok(Self { mode, space })
    }

    #[must_use]
    pub fn mode(&self) -> IdentityMode {
        self.mode
    }

    #[must_use]
    pub fn space(&self) -> u64 {
        self.space
    }

    /// Identity for the worker's next request.
    ///
    /// `None` once a unique-mode worker has used up its `space` identities; issuing
    /// another would collide with the next worker index.
    #[must_use]
    pub fn identity_for(&self, worker: &WorkerIdentity) -> Option<u64> {
        match self.mode {
            IdentityMode::Unique if worker.iterations >= self.space => None,
            IdentityMode::Unique => request_identity(worker.index, worker.iterations, self.space),
            IdentityMode::Repeat => request_identity(worker.index, 0, self.space),
        }
    }
}
