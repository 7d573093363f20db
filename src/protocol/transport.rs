use core::fmt;

/// Wire transport used to reach the destination.
///
/// HTTP and HTTPS share the batching write pipeline; the only difference is
/// whether the per-batch connection is wrapped in TLS. [`Transport::Udp`] is
/// accepted by the configuration surface but rejected at build time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Plain HTTP/1.1 over TCP.
    Http,
    /// HTTP/1.1 over TLS.
    Https,
    /// Datagram transport. Not implemented; building a client with this
    /// transport fails with a configuration error.
    Udp,
}

impl Transport {
    /// Default transport (HTTP).
    pub const DEFAULT: Self = Self::Http;

    /// Returns the lowercase scheme name used on the wire and in URLs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Https => "https",
            Transport::Udp => "udp",
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
