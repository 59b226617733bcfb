// OgmaNeo actor - Actor (sparse actor-critic with replayed multi-step TD)
#![allow(clippy::needless_range_loop)]

use log::{debug, trace, warn};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ActorError;
use crate::helpers::*;
use crate::history::HistoryBuffer;
use crate::sparse_matrix::{init_local_rf, SparseMatrix};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VisibleLayerDesc {
    pub size: Int3,
    pub radius: i32,
}

impl Default for VisibleLayerDesc {
    fn default() -> Self {
        Self {
            size: Int3::new(4, 4, 16),
            radius: 2,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    pub value_weights: SparseMatrix,
    pub action_weights: SparseMatrix,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Params {
    /// Value learning rate
    pub alpha: f32,
    /// Action learning rate
    pub beta: f32,
    /// Discount factor
    pub gamma: f32,
    pub min_steps: usize,
    pub history_iters: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            alpha: 0.03,
            beta: 0.03,
            gamma: 0.99,
            min_steps: 4,
            history_iters: 4,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ActorError> {
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(ActorError::InvalidParams(format!("alpha must be >= 0, got {}", self.alpha)));
        }
        if self.beta.is_nan() || self.beta < 0.0 {
            return Err(ActorError::InvalidParams(format!("beta must be >= 0, got {}", self.beta)));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ActorError::InvalidParams(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

// Weight deltas produced by one column's learn pass
#[derive(Clone, Debug)]
struct ColumnUpdate {
    value_delta: f32,
    action_deltas: FloatBuffer,
}

/// Reinforcement learning layer: samples one action per hidden column and
/// learns value and policy from replayed history.
#[derive(Clone, Debug, Default)]
pub struct Actor {
    hidden_size: Int3,
    hidden_cis: IntBuffer,
    hidden_values: FloatBuffer,
    hidden_values_prev: FloatBuffer,
    history: HistoryBuffer,
    rand_state: u64,
    capacity_warned: bool,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl Actor {
    // Value estimate for one column and the fan-in normalizer shared with the action head
    fn column_value(
        hidden_column_index: usize,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis: &[&[i32]],
    ) -> (f32, usize) {
        let mut sum = 0.0f32;
        let mut count = 0usize;

        for vli in 0..visible_layers.len() {
            let vl = &visible_layers[vli];
            let one_hot_size = visible_layer_descs[vli].size.z as usize;

            sum += vl.value_weights.multiply_ohvs(input_cis[vli], hidden_column_index, one_hot_size);
            count += vl.value_weights.count(hidden_column_index) / one_hot_size;
        }

        let value = if count > 0 { sum / count as f32 } else { 0.0 };

        (value, count)
    }

    // Fills `acts` with the column's action logits
    fn column_logits(
        hidden_column_index: usize,
        count: usize,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis: &[&[i32]],
        acts: &mut [f32],
    ) {
        let hidden_cells_start = hidden_column_index * acts.len();

        for (hc, act) in acts.iter_mut().enumerate() {
            let hidden_cell_index = hc + hidden_cells_start;
            let mut sum = 0.0f32;

            for vli in 0..visible_layers.len() {
                let one_hot_size = visible_layer_descs[vli].size.z as usize;

                sum += visible_layers[vli].action_weights.multiply_ohvs(
                    input_cis[vli],
                    hidden_cell_index,
                    one_hot_size,
                );
            }

            *act = if count > 0 { sum / count as f32 } else { 0.0 };
        }
    }

    // Returns (sampled action, value estimate)
    fn forward_column(
        hidden_column_index: usize,
        hidden_size: Int3,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis: &[&[i32]],
        state: &mut u64,
    ) -> (i32, f32) {
        let (value, count) =
            Self::column_value(hidden_column_index, visible_layers, visible_layer_descs, input_cis);

        let mut acts = vec![0.0f32; hidden_size.z as usize];

        Self::column_logits(
            hidden_column_index,
            count,
            visible_layers,
            visible_layer_descs,
            input_cis,
            &mut acts,
        );

        softmax(&mut acts);

        let cusp = randf_step(state);

        (sample_categorical(&acts, cusp) as i32, value)
    }

    #[allow(clippy::too_many_arguments)]
    fn learn_column(
        hidden_column_index: usize,
        hidden_size: Int3,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis_prev: &[&[i32]],
        target_ci: usize,
        value_prev: f32,
        value_bootstrap: f32,
        q: f32,
        g: f32,
        mimic: bool,
        params: &Params,
    ) -> ColumnUpdate {
        let new_value = q + g * value_bootstrap;

        // --- Value ---

        let (value, count) = Self::column_value(
            hidden_column_index,
            visible_layers,
            visible_layer_descs,
            input_cis_prev,
        );

        let td_error_value = new_value - value;

        // --- Action ---

        // judged against the estimate in effect when the action was taken
        let td_error_action = new_value - value_prev;

        let mut acts = vec![0.0f32; hidden_size.z as usize];

        Self::column_logits(
            hidden_column_index,
            count,
            visible_layers,
            visible_layer_descs,
            input_cis_prev,
            &mut acts,
        );

        softmax(&mut acts);

        let rate = if mimic || td_error_action > 0.0 {
            params.beta
        } else {
            -params.beta
        };

        let action_deltas = acts
            .iter()
            .enumerate()
            .map(|(hc, &p)| rate * ((hc == target_ci) as i32 as f32 - p))
            .collect();

        ColumnUpdate {
            value_delta: params.alpha * td_error_value,
            action_deltas,
        }
    }

    // One replay pass over every column using history sample `history_index`
    fn learn(&mut self, history_index: usize, mimic: bool, params: &Params) {
        let num_hidden_columns = self.hidden_size.num_columns();
        let hidden_size = self.hidden_size;

        let (q, g) = self.history.discounted_return(history_index, params.gamma);

        trace!("replay t={history_index} q={q} g={g}");

        let s_prev = &self.history[history_index + 1];
        let s = &self.history[history_index];

        let input_cis_prev: Vec<&[i32]> = s_prev.input_cis.iter().map(|v| v.as_slice()).collect();

        let visible_layers = &self.visible_layers;
        let visible_layer_descs = &self.visible_layer_descs;
        let hidden_values = &self.hidden_values;

        // columns only read their own rows, so deltas can be gathered in parallel
        let updates: Vec<ColumnUpdate> = (0..num_hidden_columns)
            .into_par_iter()
            .map(|i| {
                Self::learn_column(
                    i,
                    hidden_size,
                    visible_layers,
                    visible_layer_descs,
                    &input_cis_prev,
                    s.hidden_target_cis_prev[i] as usize,
                    s.hidden_values_prev[i],
                    hidden_values[i],
                    q,
                    g,
                    mimic,
                    params,
                )
            })
            .collect();

        for vli in 0..self.visible_layers.len() {
            let one_hot_size = self.visible_layer_descs[vli].size.z as usize;
            let vl_input_cis = input_cis_prev[vli];
            let vl = &mut self.visible_layers[vli];

            for (i, update) in updates.iter().enumerate() {
                vl.value_weights
                    .delta_ohvs(vl_input_cis, update.value_delta, i, one_hot_size);

                let hidden_cells_start = i * hidden_size.z as usize;

                for (hc, &delta) in update.action_deltas.iter().enumerate() {
                    vl.action_weights
                        .delta_ohvs(vl_input_cis, delta, hc + hidden_cells_start, one_hot_size);
                }
            }
        }
    }

    /// Builds local receptive fields onto every visible layer, zeroes value weights,
    /// fills action weights with small noise and pre-allocates the history.
    pub fn init_random(
        &mut self,
        hidden_size: Int3,
        history_capacity: usize,
        visible_layer_descs: Vec<VisibleLayerDesc>,
        seed: u64,
    ) -> Result<(), ActorError> {
        if hidden_size.x < 1 || hidden_size.y < 1 || hidden_size.z < 1 {
            return Err(ActorError::InvalidHiddenSize(hidden_size));
        }
        if visible_layer_descs.is_empty() {
            return Err(ActorError::NoVisibleLayers);
        }
        for (index, vld) in visible_layer_descs.iter().enumerate() {
            if vld.size.x < 1 || vld.size.y < 1 || vld.size.z < 1 || vld.radius < 0 {
                return Err(ActorError::InvalidVisibleLayer {
                    index,
                    size: vld.size,
                    radius: vld.radius,
                });
            }
        }
        if history_capacity == 0 {
            return Err(ActorError::ZeroHistoryCapacity);
        }

        self.rand_state = rand_get_state(seed);
        self.hidden_size = hidden_size;
        self.visible_layer_descs = visible_layer_descs;

        let num_hidden_columns = hidden_size.num_columns();
        let value_size = Int3::new(hidden_size.x, hidden_size.y, 1);

        let mut visible_layers = Vec::with_capacity(self.visible_layer_descs.len());

        for vld in &self.visible_layer_descs {
            let value_weights = init_local_rf(vld.size, value_size, vld.radius);
            let mut action_weights = init_local_rf(vld.size, hidden_size, vld.radius);

            for w in action_weights.non_zero_values.iter_mut() {
                *w = randf_range_step(-INIT_WEIGHT_NOISEF, INIT_WEIGHT_NOISEF, &mut self.rand_state);
            }

            visible_layers.push(VisibleLayer {
                value_weights,
                action_weights,
            });
        }

        self.visible_layers = visible_layers;

        self.hidden_cis = vec![0i32; num_hidden_columns];
        self.hidden_values = vec![0.0f32; num_hidden_columns];
        self.hidden_values_prev = vec![0.0f32; num_hidden_columns];

        let visible_column_counts: Vec<usize> = self
            .visible_layer_descs
            .iter()
            .map(|vld| vld.size.num_columns())
            .collect();

        self.history = HistoryBuffer::new(history_capacity, &visible_column_counts, num_hidden_columns);
        self.capacity_warned = false;

        debug!(
            "actor init: hidden {:?}, {} visible layers, {} weights, history capacity {}",
            hidden_size,
            self.visible_layers.len(),
            self.visible_layers
                .iter()
                .map(|vl| vl.value_weights.non_zero_values.len() + vl.action_weights.non_zero_values.len())
                .sum::<usize>(),
            history_capacity
        );

        Ok(())
    }

    /// Samples new actions for `input_cis`, records the step and replays history.
    ///
    /// Panics if the number or shape of the buffers differs from initialization.
    /// Debug builds also reject `params` that fail [`Params::validate`].
    pub fn step(
        &mut self,
        input_cis: &[&[i32]],
        hidden_target_cis_prev: &[i32],
        reward: f32,
        learn_enabled: bool,
        mimic: bool,
        params: &Params,
    ) {
        let num_hidden_columns = self.hidden_size.num_columns();
        let hidden_size = self.hidden_size;

        debug_assert!(params.validate().is_ok(), "invalid params: {params:?}");

        assert_eq!(
            input_cis.len(),
            self.visible_layer_descs.len(),
            "expected one input buffer per visible layer"
        );
        for (vli, (cis, vld)) in input_cis.iter().zip(&self.visible_layer_descs).enumerate() {
            assert_eq!(cis.len(), vld.size.num_columns(), "visible layer {vli} column count mismatch");
            assert!(
                cis.iter().all(|&c| c >= 0 && c < vld.size.z),
                "visible layer {vli} state out of range [0, {})",
                vld.size.z
            );
        }
        assert_eq!(hidden_target_cis_prev.len(), num_hidden_columns, "hidden target column count mismatch");
        assert!(
            hidden_target_cis_prev.iter().all(|&c| c >= 0 && c < hidden_size.z),
            "hidden target out of range [0, {})",
            hidden_size.z
        );

        self.hidden_values_prev.copy_from_slice(&self.hidden_values);

        // --- Forward ---

        let base_state = rand_step(&mut self.rand_state) as u64;

        let visible_layers = &self.visible_layers;
        let visible_layer_descs = &self.visible_layer_descs;

        let results: Vec<(i32, f32)> = (0..num_hidden_columns)
            .into_par_iter()
            .map(|i| {
                let mut state = rand_get_state(base_state + i as u64 * RAND_SUBSEED_OFFSET);
                Self::forward_column(
                    i,
                    hidden_size,
                    visible_layers,
                    visible_layer_descs,
                    input_cis,
                    &mut state,
                )
            })
            .collect();

        for (i, (ci, value)) in results.into_iter().enumerate() {
            self.hidden_cis[i] = ci;
            self.hidden_values[i] = value;
        }

        self.history
            .push_front(input_cis, hidden_target_cis_prev, &self.hidden_values_prev, reward);

        if !learn_enabled {
            return;
        }

        let history_size = self.history.len();
        let min_history = params.min_steps.saturating_add(1);

        if self.history.capacity() <= min_history && !self.capacity_warned {
            warn!(
                "history capacity {} can never exceed min_steps + 1 = {}; replay is disabled",
                self.history.capacity(),
                min_history
            );
            self.capacity_warned = true;
        }

        // --- Replay ---

        if history_size > min_history {
            if history_size == min_history + 1 {
                debug!("replay active at history size {history_size}");
            }

            for _ in 0..params.history_iters {
                let history_index = rand_step(&mut self.rand_state) as usize
                    % (history_size - 1 - params.min_steps)
                    + params.min_steps;

                self.learn(history_index, mimic, params);
            }
        }
    }

    /// Zeroes actions, values and the valid history count. Weights are kept.
    pub fn clear_state(&mut self) {
        self.hidden_cis.fill(0);
        self.hidden_values.fill(0.0);
        self.history.clear();
    }

    pub fn get_hidden_cis(&self) -> &[i32] {
        &self.hidden_cis
    }

    pub fn get_hidden_values(&self) -> &[f32] {
        &self.hidden_values
    }

    pub fn get_hidden_size(&self) -> Int3 {
        self.hidden_size
    }

    pub fn get_history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn get_history_capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn get_history_size(&self) -> usize {
        self.history.len()
    }

    pub fn get_num_visible_layers(&self) -> usize {
        self.visible_layers.len()
    }

    pub fn get_visible_layer(&self, i: usize) -> &VisibleLayer {
        &self.visible_layers[i]
    }

    pub fn get_visible_layer_desc(&self, i: usize) -> &VisibleLayerDesc {
        &self.visible_layer_descs[i]
    }

    // Serialization (raw buffer contents; shapes come from init_random)
    pub fn write_state(&self, writer: &mut dyn StreamWriter) {
        writer.write_i32_slice(&self.hidden_cis);
        writer.write_f32_slice(&self.hidden_values);
        writer.write_i32(self.history.len() as i32);
        writer.write_i32(self.history.start() as i32);

        for t in 0..self.history.capacity() {
            let s = &self.history[t];
            for vl_input_cis in &s.input_cis {
                writer.write_i32_slice(vl_input_cis);
            }
            writer.write_i32_slice(&s.hidden_target_cis_prev);
            writer.write_f32_slice(&s.hidden_values_prev);
            writer.write_f32(s.reward);
        }
    }

    pub fn read_state(&mut self, reader: &mut dyn StreamReader) {
        reader.read_i32_slice(&mut self.hidden_cis);
        reader.read_f32_slice(&mut self.hidden_values);
        let history_size = reader.read_i32() as usize;
        let history_start = reader.read_i32() as usize;
        self.history.restore(history_size, history_start);

        for t in 0..self.history.capacity() {
            let s = self.history.slot_mut(t);
            for vl_input_cis in s.input_cis.iter_mut() {
                reader.read_i32_slice(vl_input_cis);
            }
            reader.read_i32_slice(&mut s.hidden_target_cis_prev);
            reader.read_f32_slice(&mut s.hidden_values_prev);
            s.reward = reader.read_f32();
        }
    }

    pub fn write_weights(&self, writer: &mut dyn StreamWriter) {
        for vl in &self.visible_layers {
            writer.write_f32_slice(&vl.value_weights.non_zero_values);
            writer.write_f32_slice(&vl.action_weights.non_zero_values);
        }
    }

    pub fn read_weights(&mut self, reader: &mut dyn StreamReader) {
        for vl in &mut self.visible_layers {
            reader.read_f32_slice(&mut vl.value_weights.non_zero_values);
            reader.read_f32_slice(&mut vl.action_weights.non_zero_values);
        }
    }
}
