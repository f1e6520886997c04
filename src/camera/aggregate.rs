use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    AllConnected,
    PartiallyConnected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::AllConnected => "all cameras connected",
            Self::PartiallyConnected => "some cameras connected",
            Self::Disconnected => "connection error",
        }
    }
}

/// System-wide connectivity, e.g. "1/2 online".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub status: ConnectionStatus,
    pub streaming: usize,
    pub total: usize,
}

impl ConnectionSummary {
    pub fn from_streaming<I>(streaming: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (online, total) = streaming
            .into_iter()
            .fold((0, 0), |(online, total), is_streaming| {
                (online + usize::from(is_streaming), total + 1)
            });

        let status = if total > 0 && online == total {
            ConnectionStatus::AllConnected
        } else if online > 0 {
            ConnectionStatus::PartiallyConnected
        } else {
            ConnectionStatus::Disconnected
        };

        Self {
            status,
            streaming: online,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionStatus, ConnectionSummary};

    #[test]
    fn counts_streaming_cameras() {
        let all = ConnectionSummary::from_streaming([true, true]);
        assert_eq!(all.status, ConnectionStatus::AllConnected);
        assert_eq!((all.streaming, all.total), (2, 2));

        let partial = ConnectionSummary::from_streaming([false, true]);
        assert_eq!(partial.status, ConnectionStatus::PartiallyConnected);
        assert_eq!(partial.streaming, 1);

        let none = ConnectionSummary::from_streaming([false, false]);
        assert_eq!(none.status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn no_cameras_is_disconnected() {
        let empty = ConnectionSummary::from_streaming(std::iter::empty());
        assert_eq!(empty.status, ConnectionStatus::Disconnected);
        assert_eq!(empty.total, 0);
    }
}
