/*
 * Copyright 2025 append-compaction
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

/// First-Fit-Decreasing bin packer.
///
/// Items are sorted by weight, heaviest first, and each item goes into the
/// newest bin if it still has room. An item heavier than the target gets a
/// bin of its own.
#[derive(Debug, Clone)]
pub struct ListPacker {
    pub target_weight: u64,
}

impl ListPacker {
    pub fn new(target_weight: u64) -> Self {
        Self { target_weight }
    }

    pub fn pack<T, F>(&self, mut items: Vec<T>, weight_func: F) -> Vec<Vec<T>>
    where
        F: Fn(&T) -> u64,
    {
        items.sort_by_key(|item| std::cmp::Reverse(weight_func(item)));

        let mut bins: Vec<Bin<T>> = vec![];
        for item in items {
            let weight = weight_func(&item);
            match bins
                .last_mut()
                .filter(|bin| bin.fits(weight, self.target_weight))
            {
                Some(bin) => bin.push(item, weight),
                None => {
                    let mut bin = Bin::default();
                    bin.push(item, weight);
                    bins.push(bin);
                }
            }
        }

        bins.into_iter().map(|bin| bin.items).collect()
    }
}

struct Bin<T> {
    items: Vec<T>,
    weight: u64,
}

impl<T> Default for Bin<T> {
    fn default() -> Self {
        Self {
            items: vec![],
            weight: 0,
        }
    }
}

impl<T> Bin<T> {
    fn fits(&self, weight: u64, target: u64) -> bool {
        // A zero target collapses everything into one bin.
        target == 0 || self.weight.saturating_add(weight) <= target
    }

    fn push(&mut self, item: T, weight: u64) {
        self.weight = self.weight.saturating_add(weight);
        self.items.push(item);
    }
}
