use derive_more::Display;

/// Outcome byte written right after the request id of every reply.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DispatchStatus {
    #[display(fmt = "ok")]
    Ok = 0,
    #[display(fmt = "user exception")]
    UserException = 1,
    #[display(fmt = "object does not exist")]
    ObjectNotExist = 2,
    #[display(fmt = "facet does not exist")]
    FacetNotExist = 3,
    #[display(fmt = "operation does not exist")]
    OperationNotExist = 4,
    #[display(fmt = "unknown local exception")]
    UnknownLocalException = 5,
    #[display(fmt = "unknown user exception")]
    UnknownUserException = 6,
    #[display(fmt = "unknown exception")]
    UnknownException = 7,
}

impl DispatchStatus {
    /// Routing statuses carry identity, facet and operation instead of a payload.
    #[inline]
    pub fn is_routing(self) -> bool {
        matches!(
            self,
            DispatchStatus::ObjectNotExist
                | DispatchStatus::FacetNotExist
                | DispatchStatus::OperationNotExist
        )
    }
}

impl From<DispatchStatus> for u8 {
    fn from(status: DispatchStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for DispatchStatus {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => DispatchStatus::Ok,
            1 => DispatchStatus::UserException,
            2 => DispatchStatus::ObjectNotExist,
            3 => DispatchStatus::FacetNotExist,
            4 => DispatchStatus::OperationNotExist,
            5 => DispatchStatus::UnknownLocalException,
            6 => DispatchStatus::UnknownUserException,
            7 => DispatchStatus::UnknownException,
            other => return Err(other),
        })
    }
}
