/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::codegen::platform::VariableLayers;

use super::Variable;

#[derive(Debug, Copy, Clone)]
struct VariableRange {
    begin_index: u32,
    end_index: u32,
    layer_index: u32,
}

fn ranges_collide(a: &VariableRange, b: &VariableRange) -> bool {
    if a.layer_index != b.layer_index {
        return false;
    }

    if a.begin_index >= b.begin_index && a.begin_index <= b.end_index {
        return true;
    }

    if a.begin_index <= b.begin_index && a.end_index >= b.begin_index {
        return true;
    }

    false
}

/// Interval-colors variables onto memory units, hottest first. Ref-target
/// and static variables are placed directly and never consume a unit.
pub fn assign_mem_units(vars: &mut [Variable], layers: &VariableLayers) {
    let mut order: Vec<usize> = (0..vars.len()).collect();
    order.sort_by(|a, b| vars[*b].uses.len().cmp(&vars[*a].uses.len()));

    let mut mem_units_ranges: Vec<Vec<VariableRange>> = Vec::new();

    for var_id in order {
        let var = &vars[var_id];

        if var.can_be_ref_target || var.is_static {
            continue;
        }

        let new_range = VariableRange {
            begin_index: var.begin_index,
            end_index: var.end_index,
            layer_index: layers.indices[var.kind.index()],
        };

        let free_unit = mem_units_ranges.iter().position(|ranges| {
            ranges.iter().all(|range| !ranges_collide(range, &new_range))
        });

        match free_unit {
            Some(unit) => {
                vars[var_id].mem_unit = unit as u32;
                mem_units_ranges[unit].push(new_range);
            }
            None => {
                vars[var_id].mem_unit = mem_units_ranges.len() as u32;
                mem_units_ranges.push(vec![new_range]);
            }
        }
    }
}
