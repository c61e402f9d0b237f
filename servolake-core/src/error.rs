pub type AnyError = anyhow::Error;
pub type AnyResult<T> = anyhow::Result<T>;
