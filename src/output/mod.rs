
// re-exporting writers
mod text;    // impl State::output_text
mod dot;     pub use dot::DotConf;
mod escaper; pub use escaper::*;

#[derive( PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Dot,
}
