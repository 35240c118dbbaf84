use thiserror::Error;

// ---------------------------------------------------------------------------
// Interaction / extraction errors
// ---------------------------------------------------------------------------

/// Errors raised while building a parameter map or resolving a pointer
/// event. None of these are fatal: the UI reports them and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    /// Parameter or component list has no selection.
    #[error("Select a parameter and a component first.")]
    SelectionMissing,

    /// Selection refers to a parameter or component the fit does not have.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Pointer event carried no data coordinates.
    #[error("You clicked outside the plot!")]
    OutsidePlotArea,

    /// Negative or out-of-range spaxel indices.
    #[error("Index Error!")]
    IndexError { x: i64, y: i64 },

    /// Median over an empty set of unmasked values.
    #[error("Median undefined: every pixel of the map is masked.")]
    DivisionUndefined,

    /// Fit-window spectrum of the spaxel is all zeros or missing.
    #[error("Spectrum is null.")]
    NullSpectrum { x: usize, y: usize },
}
