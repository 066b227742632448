use tokio::sync::Mutex as AsyncMutex;

/// Serializes tests that touch `VEX_*` variables, since the environment is
/// shared by every test thread. Sync tests take it with `.blocking_lock()`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());
