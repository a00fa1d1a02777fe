//! Presentation seam. The engine never draws; front ends implement this.

use std::io;

use crate::{
    catalog::Catalog,
    state::{SimulationState, Subject},
};

pub trait Renderer {
    /// Draw the subject's fangs and the player's status line.
    fn render(&mut self, state: &SimulationState, subject: &Subject, catalog: &Catalog) -> io::Result<()>;
}
