/// Data layer: cube and fit types, loading, and map extraction.
///
/// Architecture:
/// ```text
///  cube / fit (.json / .parquet)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse files → DataCube, FitResult
///   └──────────┘
///        │
///        ├──────────────────────────┐
///        ▼                          ▼
///   ┌──────────┐              ┌──────────┐
///   │ selector  │ → DisplayImage│  spaxel   │ → SpaxelPlot
///   └──────────┘              └──────────┘
///                                   │
///                                   ▼
///                             ┌──────────┐
///                             │ profile   │  Gaussian / Gauss-Hermite
///                             └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod profile;
pub mod selector;
pub mod spaxel;
