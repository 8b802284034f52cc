//! Permission and creation flags shared by the arena and index handles.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::ReadWrite => "read-write",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaFlags {
    pub create: bool,
}

impl ArenaFlags {
    pub const NONE: ArenaFlags = ArenaFlags { create: false };
    pub const CREATE: ArenaFlags = ArenaFlags { create: true };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexFlags {
    pub create: bool,
    pub mmap: bool,
}

impl IndexFlags {
    pub const NONE: IndexFlags = IndexFlags { create: false, mmap: false };
    pub const CREATE: IndexFlags = IndexFlags { create: true, mmap: false };
    pub const MMAP: IndexFlags = IndexFlags { create: false, mmap: true };

    pub fn with_mmap(mut self, mmap: bool) -> Self {
        self.mmap = mmap;
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}
