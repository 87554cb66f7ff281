//! # Utilidades de logging para errores
//!
//! Registro de la cadena completa de errores (`source()`) para los fallos que
//! no se devuelven al cliente, como la conciliación de un webhook ya aceptado.

use std::error::Error as StdError;

/// Recorre la cadena de `source()` y devuelve cada nivel como texto
pub fn error_chain<E>(error: &E) -> Vec<String>
where
    E: StdError + 'static,
{
    let mut chain = Vec::new();
    let mut current: Option<&dyn StdError> = Some(error);

    while let Some(err) = current {
        chain.push(err.to_string());
        current = err.source();
    }

    chain
}

/// Registra la cadena completa de errores con un contexto
///
/// # Ejemplo
/// ```ignore
/// if let Err(e) = reconcile(&state, &event).await {
///     log_error_chain(&e, "reconcile_booking");
/// }
/// ```
pub fn log_error_chain<E>(error: &E, context: &str)
where
    E: StdError + 'static,
{
    tracing::error!(
        context = %context,
        error_chain = ?error_chain(error),
        "Error with full chain"
    );
}

/// Extension trait para Results que registra la cadena de error y la descarta
pub trait ErrorLogExt<T> {
    /// Registra el error (si lo hay) y lo convierte en `None`
    fn log_and_discard(self, context: &str) -> Option<T>;
}

impl<T, E> ErrorLogExt<T> for Result<T, E>
where
    E: StdError + 'static,
{
    fn log_and_discard(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                log_error_chain(&error, context);
                None
            }
        }
    }
}
