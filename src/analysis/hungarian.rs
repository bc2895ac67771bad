/// Minimum-cost assignment between rows and columns of a rectangular cost
/// matrix (Jonker-Volgenant style shortest augmenting paths, O(n³)).
///
/// The matrix is padded to square with a large cost; only real row/column
/// pairs are returned, sorted by row. `f64::INFINITY` entries mark forbidden
/// pairs and never appear in the result.
pub fn assign(costs: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = costs.len();
    let cols = costs.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let n = rows.max(cols);
    // Dominates any real cost without overflowing the potentials.
    let big = 1e12;
    let mut c = vec![vec![big; n]; n];
    for (i, row) in costs.iter().enumerate() {
        for (j, &cost) in row.iter().enumerate().take(cols) {
            c[i][j] = if cost.is_finite() { cost } else { big };
        }
    }

    // Potentials and the column -> row matching are 1-indexed; index 0 is the
    // virtual source column.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0_usize;
        let mut min_val = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = c[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < min_val[j] {
                    min_val[j] = reduced;
                    way[j] = j0;
                }
                if min_val[j] < delta {
                    delta = min_val[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_val[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let prev = way[j0];
            p[j0] = p[prev];
            j0 = prev;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=n)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .filter(|&(i, j)| i < rows && j < cols && costs[i][j].is_finite())
        .collect();
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_global_minimum_over_greedy() {
        // Greedy would take (0,0)=1 and then (1,1)=10.
        let costs = vec![vec![1.0, 2.0], vec![2.0, 10.0]];
        assert_eq!(assign(&costs), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn rectangular_and_forbidden_pairs() {
        let inf = f64::INFINITY;
        let costs = vec![vec![inf, 3.0, 1.0]];
        assert_eq!(assign(&costs), vec![(0, 2)]);
        let costs = vec![vec![inf], vec![inf]];
        assert!(assign(&costs).is_empty());
        assert!(assign(&[]).is_empty());
    }

    #[test]
    fn negative_costs_maximise_scores() {
        let costs = vec![vec![-5.0, -1.0], vec![-4.0, -3.0]];
        assert_eq!(assign(&costs), vec![(0, 0), (1, 1)]);
    }
}
