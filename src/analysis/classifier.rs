/// Descriptor classification by Linux object semantics
use serde::{Deserialize, Serialize};

/// Semantic category of one descriptor - closed set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorCategory {
    Standard,
    File,
    Pipe,
    Other,
    Socket,
}

impl DescriptorCategory {
    pub const ALL: [DescriptorCategory; 5] = [
        DescriptorCategory::Standard,
        DescriptorCategory::File,
        DescriptorCategory::Pipe,
        DescriptorCategory::Other,
        DescriptorCategory::Socket,
    ];

    /// Forensic danger rank, 1 (benign) to 5 (most retained kernel state)
    pub fn danger_rank(&self) -> u8 {
        match self {
            DescriptorCategory::Standard => 1,
            DescriptorCategory::File => 2,
            DescriptorCategory::Pipe => 3,
            DescriptorCategory::Other => 4,
            DescriptorCategory::Socket => 5,
        }
    }

    pub fn danger_reason(&self) -> &'static str {
        match self {
            DescriptorCategory::Standard => "Standard file descriptors (stdin, stdout, stderr) are always present and are automatically managed by the OS.",
            DescriptorCategory::File => "Regular file descriptors may hold inode references and file locks, which can delay resource release if leaked.",
            DescriptorCategory::Pipe => "Pipes involve kernel buffers and IPC synchronization, making leaks more impactful under load.",
            DescriptorCategory::Other => "Other descriptors often map to device files or anonymous kernel objects with less predictable lifetimes.",
            DescriptorCategory::Socket => "Sockets maintain kernel networking state, buffers, and remote connections, making leaks highly dangerous.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorCategory::Standard => "Standard",
            DescriptorCategory::File => "File",
            DescriptorCategory::Pipe => "Pipe",
            DescriptorCategory::Other => "Other",
            DescriptorCategory::Socket => "Socket",
        }
    }
}

impl std::fmt::Display for DescriptorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a descriptor target; first matching rule wins.
///
/// Indices 0, 1 and 2 are always `Standard`, whatever they point at.
pub fn classify(target: &str, index: Option<u32>) -> DescriptorCategory {
    if matches!(index, Some(0..=2)) {
        return DescriptorCategory::Standard;
    }

    if target.starts_with("socket:") {
        DescriptorCategory::Socket
    } else if target.starts_with("pipe:") {
        DescriptorCategory::Pipe
    } else if target.starts_with('/') {
        DescriptorCategory::File
    } else {
        DescriptorCategory::Other
    }
}
