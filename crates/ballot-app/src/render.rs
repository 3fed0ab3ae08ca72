// Presentation seam. The engine decides when and what to render; the
// implementation decides how.

use crate::protocol::{Notice, RenderScope};
use crate::state::ViewState;

pub trait Renderer: Send {
    fn render(&mut self, view: &ViewState, scope: RenderScope);

    fn notify(&mut self, notice: &Notice);
}
