//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Loop de aceptación: acepta una conexión, la envuelve junto con el
//! handler en una `Task` y la despacha en el `Runner` configurado.

pub mod socket;

// Re-exportar para facilitar el uso
pub use socket::Server;
