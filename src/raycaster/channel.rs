use crate::enums::GradientComputation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOption {
    pub identifier: String,
    pub display_name: String,
    pub value: usize,
}

impl ChannelOption {
    fn numbered(value: usize) -> Self {
        let name = format!("Channel {}", value + 1);
        Self {
            identifier: name.clone(),
            display_name: name,
            value,
        }
    }
}

/// Which volume component the raycaster renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelection {
    options: Vec<ChannelOption>,
    selected: usize,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            options: vec![ChannelOption::numbered(0)],
            selected: 0,
        }
    }
}

impl ChannelSelection {
    pub fn options(&self) -> &[ChannelOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Selected channel index.
    pub fn selected(&self) -> usize {
        self.options[self.selected].value
    }

    /// Returns false and keeps the selection if `index` is not an option.
    pub fn select(&mut self, index: usize) -> bool {
        match self.options.iter().position(|o| o.value == index) {
            Some(position) => {
                self.selected = position;
                true
            }
            None => false,
        }
    }

    /// Rebuilds the options to one per component.
    ///
    /// The current selection survives if its identifier still exists,
    /// otherwise the first channel is selected. Returns true if the options
    /// changed.
    pub fn sync_components(&mut self, components: usize) -> bool {
        let components = components.max(1);
        if components == self.options.len() {
            return false;
        }
        let previous = self.options[self.selected].identifier.clone();
        self.options = (0..components).map(ChannelOption::numbered).collect();
        self.selected = self
            .options
            .iter()
            .position(|o| o.identifier == previous)
            .unwrap_or(0);
        true
    }

    /// Precomputed gradients in a four-component volume dictate where the
    /// scalar lives.
    pub fn apply_gradient_mode(&mut self, mode: GradientComputation) {
        if self.options.len() != 4 {
            return;
        }
        match mode {
            GradientComputation::PrecomputedXyz => {
                self.select(3);
            }
            GradientComputation::PrecomputedYzw => {
                self.select(0);
            }
            _ => {}
        }
    }
}
