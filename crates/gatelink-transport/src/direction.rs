/// Access mode requested when opening a channel endpoint.
///
/// Plain opens accept only `Read` or `Write`; `ReadWrite` is valid solely
/// for the pair-open primitive on transports that support symmetric open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    ReadWrite,
}

impl Direction {
    pub fn is_read(self) -> bool {
        matches!(self, Direction::Read)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Direction::Write)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Read => "read-only",
            Direction::Write => "write-only",
            Direction::ReadWrite => "read-write",
        })
    }
}
