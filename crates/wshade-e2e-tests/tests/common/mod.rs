use wshade_analysis::{AnalysisOptions, LayerAnalysis};
use wshade_ir::{Layer, SymbolId};

/// Parse `.wsir` source into a layer.
#[allow(dead_code)]
pub fn parse(source: &str) -> Layer {
    wshade_parser::parse(source).expect("IR parse failed")
}

/// Run the analysis with default options.
#[allow(dead_code)]
pub fn analyze(layer: &Layer) -> LayerAnalysis<'_> {
    wshade_analysis::analyze(layer, &AnalysisOptions::default()).expect("analysis failed")
}

/// Look up a symbol by name, panicking when absent.
#[allow(dead_code)]
pub fn sym(layer: &Layer, name: &str) -> SymbolId {
    layer
        .find_symbol(name)
        .unwrap_or_else(|| panic!("no symbol named '{name}'"))
}

/// Names of all varying symbols, in declaration order.
#[allow(dead_code)]
pub fn varying_names(layer: &Layer, analysis: &LayerAnalysis<'_>) -> Vec<String> {
    layer
        .symbols()
        .filter(|(id, _)| !analysis.is_uniform(*id))
        .map(|(_, s)| s.name.clone())
        .collect()
}
